//! Session orchestrator
//!
//! [`FantasmaCore`] owns one platform adapter and runs at most one sharing
//! session at a time:
//!
//! ```text
//!            start() ok
//!  INACTIVE ───────────▶ ACTIVE
//!     ▲                    │
//!     └────────────────────┘
//!            stop() ok
//! ```
//!
//! Validation failures and a second `start` are errors. Anything that goes
//! wrong inside the adapter is logged, reported to `on_error` hooks and
//! surfaces as `false`.

use crate::adapter::{PlatformAdapter, StatusMap};
use crate::error::{FantasmaError, FantasmaResult};
use crate::interface::{NetworkInterface, NetworkMode, SharingConfig};
use crate::registry::{ExtensionRegistry, HookContext, HookEvent};
use crate::session::{SessionRecord, SessionStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct SessionState {
    config: Option<SharingConfig>,
    session_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn activate(&mut self, config: SharingConfig, session_id: Uuid, started_at: DateTime<Utc>) {
        self.config = Some(config);
        self.session_id = Some(session_id);
        self.started_at = Some(started_at);
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Snapshot returned by [`FantasmaCore::get_status`]
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub active: bool,
    pub mode: Option<NetworkMode>,
    pub source_interface: Option<String>,
    pub target_interface: Option<String>,
    /// Session configuration as it was started
    pub config: Option<SharingConfig>,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<i64>,
    /// Adapter display name
    pub platform_name: String,
    /// Live facts from the adapter
    pub platform: StatusMap,
}

impl SessionStatus {
    /// Copy safe to print, with the passphrase masked
    pub fn redacted(&self) -> Self {
        Self {
            config: self.config.as_ref().map(SharingConfig::redacted),
            ..self.clone()
        }
    }
}

pub struct FantasmaCore {
    adapter: Box<dyn PlatformAdapter>,
    registry: Arc<ExtensionRegistry>,
    state: Mutex<SessionState>,
    store: Option<SessionStore>,
}

impl FantasmaCore {
    pub fn new(adapter: Box<dyn PlatformAdapter>, registry: Arc<ExtensionRegistry>) -> Self {
        info!("FantasmaCore initialized for {}", adapter.name());
        Self {
            adapter,
            registry,
            state: Mutex::new(SessionState::default()),
            store: None,
        }
    }

    /// Persist sessions in `store` and pick up a session recorded there by an
    /// earlier process
    pub async fn with_session_store(mut self, store: SessionStore) -> FantasmaResult<Self> {
        if let Some(record) = store.load().await? {
            info!(
                "Resuming session {} ({} {} -> {})",
                record.session_id,
                record.config.mode,
                record.config.source_interface.name,
                record.config.target_interface.name
            );
            self.state
                .get_mut()
                .activate(record.config, record.session_id, record.started_at);
        }
        self.store = Some(store);
        Ok(self)
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.config.is_some()
    }

    /// Configuration of the running session, exactly as it was started
    pub async fn config(&self) -> Option<SharingConfig> {
        self.state.lock().await.config.clone()
    }

    fn trigger(&self, event: HookEvent, config: Option<&SharingConfig>) {
        self.registry.trigger_hook(&HookContext::new(event, config));
    }

    fn trigger_error(&self, config: Option<&SharingConfig>, message: &str) {
        self.registry
            .trigger_hook(&HookContext::new(HookEvent::OnError, config).with_error(message));
    }

    fn check(&self, config: &SharingConfig) -> FantasmaResult<()> {
        if !config.validate() {
            return Err(FantasmaError::Validation(
                "WiFi hotspot requires SSID and password".to_string(),
            ));
        }
        if config.mode == NetworkMode::Hotspot {
            config.check_addressing()?;
        }
        self.registry.run_validators(config)
    }

    /// Start sharing
    ///
    /// `Err` when the configuration is rejected or a session is already
    /// running (the adapter is not called). The configuration is checked
    /// first. `Ok(false)` when the adapter
    /// failed; the session stays inactive.
    pub async fn start(&self, config: SharingConfig) -> FantasmaResult<bool> {
        let mut state = self.state.lock().await;

        if let Err(e) = self.check(&config) {
            error!("Invalid configuration: {}", e);
            return Err(e);
        }

        if let Some(ref active) = state.config {
            return Err(FantasmaError::AlreadyActive {
                mode: active.mode.to_string(),
                source_interface: active.source_interface.name.clone(),
                target_interface: active.target_interface.name.clone(),
            });
        }

        info!(
            "Starting {} mode: {} -> {}",
            config.mode, config.source_interface.name, config.target_interface.name
        );
        self.trigger(HookEvent::PreStart, Some(&config));

        let result = match config.mode {
            NetworkMode::Hotspot => self.adapter.start_hotspot(&config).await,
            NetworkMode::Bridge => self.adapter.start_bridge(&config).await,
        };

        match result {
            Ok(true) => {
                let record = SessionRecord::new(self.adapter.name(), &config);
                if let Some(ref store) = self.store {
                    if let Err(e) = store.save(&record).await {
                        warn!("Could not persist session: {}", e);
                    }
                }
                state.activate(config, record.session_id, record.started_at);
                info!("Network sharing started successfully");
                self.trigger(HookEvent::PostStart, state.config.as_ref());
                Ok(true)
            }
            Ok(false) => {
                error!("Failed to start network sharing");
                self.trigger_error(Some(&config), "adapter reported failure");
                Ok(false)
            }
            Err(e) => {
                error!("Error starting sharing: {}", e);
                self.trigger_error(Some(&config), &e.to_string());
                Ok(false)
            }
        }
    }

    /// Stop the running session; `true` if nothing was running
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;

        let Some(config) = state.config.clone() else {
            info!("No active sharing to stop");
            return true;
        };

        info!("Stopping network sharing");
        self.teardown(&mut state, Some(&config)).await
    }

    /// Run the adapter teardown whether or not a session is known
    pub async fn force_stop(&self) -> bool {
        let mut state = self.state.lock().await;
        let config = state.config.clone();

        warn!("Forcing teardown of network sharing");
        self.teardown(&mut state, config.as_ref()).await
    }

    async fn teardown(&self, state: &mut SessionState, config: Option<&SharingConfig>) -> bool {
        self.trigger(HookEvent::PreStop, config);

        let failure = match self.adapter.stop_sharing().await {
            Ok(true) => None,
            Ok(false) => Some("adapter reported failure".to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Some(message) = failure {
            error!("Failed to stop network sharing: {}", message);
            self.trigger_error(config, &message);
            return false;
        }

        state.clear();
        if let Some(ref store) = self.store {
            if let Err(e) = store.clear().await {
                warn!("Could not remove session file: {}", e);
            }
        }
        info!("Network sharing stopped");
        self.trigger(HookEvent::PostStop, config);
        true
    }

    /// Session state merged with live facts from the adapter
    pub async fn get_status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        let platform = self.adapter.get_status().await;

        let config = state.config.as_ref();
        SessionStatus {
            active: config.is_some(),
            mode: config.map(|c| c.mode),
            source_interface: config.map(|c| c.source_interface.name.clone()),
            target_interface: config.map(|c| c.target_interface.name.clone()),
            config: config.cloned(),
            session_id: state.session_id,
            started_at: state.started_at,
            uptime_secs: state
                .started_at
                .map(|t| (Utc::now() - t).num_seconds().max(0)),
            platform_name: self.adapter.name().to_string(),
            platform,
        }
    }

    pub async fn detect_interfaces(&self) -> Vec<NetworkInterface> {
        self.adapter.detect_interfaces().await
    }

    /// Look up a detected interface by name
    pub async fn find_interface(&self, name: &str) -> FantasmaResult<NetworkInterface> {
        self.detect_interfaces()
            .await
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| FantasmaError::InterfaceNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ConnectionType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingAdapter {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl PlatformAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "Counting"
        }
        async fn detect_interfaces(&self) -> Vec<NetworkInterface> {
            vec![NetworkInterface::new("eth0", ConnectionType::Ethernet)]
        }
        async fn start_hotspot(&self, _config: &SharingConfig) -> FantasmaResult<bool> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        async fn start_bridge(&self, _config: &SharingConfig) -> FantasmaResult<bool> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        async fn stop_sharing(&self) -> FantasmaResult<bool> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
        async fn get_status(&self) -> StatusMap {
            StatusMap::new()
        }
        async fn is_supported(&self) -> bool {
            true
        }
    }

    fn bridge() -> SharingConfig {
        SharingConfig::new(
            NetworkMode::Bridge,
            NetworkInterface::new("eth0", ConnectionType::Ethernet),
            NetworkInterface::new("eth1", ConnectionType::Ethernet),
        )
    }

    #[tokio::test]
    async fn test_session_resumes_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));

        let first = FantasmaCore::new(Box::<CountingAdapter>::default(), Arc::new(ExtensionRegistry::new()))
            .with_session_store(store.clone())
            .await
            .unwrap();
        assert!(first.start(bridge()).await.unwrap());
        let started = first.get_status().await;

        let second = FantasmaCore::new(Box::<CountingAdapter>::default(), Arc::new(ExtensionRegistry::new()))
            .with_session_store(store.clone())
            .await
            .unwrap();
        let resumed = second.get_status().await;
        assert!(resumed.active);
        assert_eq!(resumed.session_id, started.session_id);
        assert_eq!(resumed.target_interface.as_deref(), Some("eth1"));
        assert_eq!(second.config().await, Some(bridge()));

        assert!(second.stop().await);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resumed_hotspot_keeps_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        let mut hotspot = bridge();
        hotspot.mode = NetworkMode::Hotspot;
        let hotspot = hotspot.with_credentials("Test", "testpass1");

        let first = FantasmaCore::new(Box::<CountingAdapter>::default(), Arc::new(ExtensionRegistry::new()))
            .with_session_store(store.clone())
            .await
            .unwrap();
        assert!(first.start(hotspot.clone()).await.unwrap());

        let second = FantasmaCore::new(Box::<CountingAdapter>::default(), Arc::new(ExtensionRegistry::new()))
            .with_session_store(store)
            .await
            .unwrap();
        assert_eq!(second.config().await, Some(hotspot.clone()));

        let status = second.get_status().await;
        assert_eq!(status.config, Some(hotspot));
        let shown = status.redacted();
        assert_eq!(shown.config.unwrap().password.as_deref(), Some("********"));
        assert_eq!(shown.session_id, status.session_id);
    }

    #[tokio::test]
    async fn test_force_stop_without_session() {
        let core = FantasmaCore::new(Box::<CountingAdapter>::default(), Arc::new(ExtensionRegistry::new()));
        assert!(core.stop().await);
        assert!(core.force_stop().await);
        assert!(!core.is_active().await);
    }

    #[tokio::test]
    async fn test_find_interface() {
        let core = FantasmaCore::new(Box::<CountingAdapter>::default(), Arc::new(ExtensionRegistry::new()));
        assert_eq!(core.find_interface("eth0").await.unwrap().name, "eth0");
        assert!(matches!(
            core.find_interface("wlan9").await,
            Err(FantasmaError::InterfaceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_hotspot_addressing_checked_before_adapter() {
        let core = FantasmaCore::new(Box::<CountingAdapter>::default(), Arc::new(ExtensionRegistry::new()));
        let mut config = bridge();
        config.mode = NetworkMode::Hotspot;
        config.ip_range = "10.0.0.0/33".to_string();

        assert!(matches!(core.start(config).await, Err(FantasmaError::Validation(_))));
        assert!(!core.is_active().await);
    }
}
