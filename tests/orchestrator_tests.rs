//! Session lifecycle tests against a mocked platform adapter

use async_trait::async_trait;
use libfantasma::*;
use mockall::mock;
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

mock! {
    pub Adapter {}

    #[async_trait]
    impl PlatformAdapter for Adapter {
        fn name(&self) -> &'static str;
        async fn detect_interfaces(&self) -> Vec<NetworkInterface>;
        async fn start_hotspot(&self, config: &SharingConfig) -> FantasmaResult<bool>;
        async fn start_bridge(&self, config: &SharingConfig) -> FantasmaResult<bool>;
        async fn stop_sharing(&self) -> FantasmaResult<bool>;
        async fn get_status(&self) -> StatusMap;
        async fn is_supported(&self) -> bool;
    }
}

fn mock_adapter() -> MockAdapter {
    let mut adapter = MockAdapter::new();
    adapter.expect_name().return_const("Mock");
    adapter.expect_get_status().returning(StatusMap::new);
    adapter
}

fn eth0() -> NetworkInterface {
    NetworkInterface::new("eth0", ConnectionType::Ethernet)
}

fn wlan0() -> NetworkInterface {
    NetworkInterface::new("wlan0", ConnectionType::Wifi)
}

fn wifi_hotspot(ssid: &str, password: &str) -> SharingConfig {
    SharingConfig::new(NetworkMode::Hotspot, eth0(), wlan0()).with_credentials(ssid, password)
}

fn core_with(adapter: MockAdapter, registry: ExtensionRegistry) -> FantasmaCore {
    FantasmaCore::new(Box::new(adapter), Arc::new(registry))
}

#[test]
fn test_validate_rules() {
    assert!(wifi_hotspot("Test", "testpass1").validate());
    assert!(!wifi_hotspot("", "testpass1").validate());
    assert!(!wifi_hotspot("Test", "").validate());
    assert!(!SharingConfig::new(NetworkMode::Hotspot, eth0(), wlan0()).validate());

    let usb = NetworkInterface::new("usb0", ConnectionType::Usb);
    assert!(SharingConfig::new(NetworkMode::Hotspot, eth0(), usb).validate());
    assert!(SharingConfig::new(NetworkMode::Bridge, eth0(), wlan0()).validate());
}

#[tokio::test]
async fn test_hotspot_session_reports_status() {
    let mut adapter = mock_adapter();
    adapter
        .expect_start_hotspot()
        .withf(|c| c.ssid.as_deref() == Some("Test"))
        .times(1)
        .returning(|_| Ok(true));
    let core = core_with(adapter, ExtensionRegistry::new());

    let config = wifi_hotspot("Test", "testpass1");
    assert!(config.validate());
    assert!(assert_ok!(core.start(config.clone()).await));

    let status = core.get_status().await;
    assert!(status.active);
    assert_eq!(status.mode, Some(NetworkMode::Hotspot));
    assert_eq!(status.source_interface.as_deref(), Some("eth0"));
    assert_eq!(status.target_interface.as_deref(), Some("wlan0"));
    assert_eq!(status.platform_name, "Mock");
    assert!(status.session_id.is_some());
    assert_eq!(status.config, Some(config.clone()));

    let json = serde_json::to_value(status.redacted()).unwrap();
    assert_eq!(json["mode"], "hotspot");
    assert_eq!(json["config"]["ssid"], "Test");
    assert_eq!(json["config"]["password"], "********");

    assert_eq!(core.config().await, Some(config));
}

#[tokio::test]
async fn test_invalid_config_never_reaches_adapter() {
    let mut adapter = mock_adapter();
    adapter.expect_start_hotspot().never();
    let core = core_with(adapter, ExtensionRegistry::new());

    let err = assert_err!(core.start(wifi_hotspot("", "")).await);
    assert!(matches!(err, FantasmaError::Validation(_)));
    assert!(!core.is_active().await);
}

#[tokio::test]
async fn test_second_start_keeps_first_session() {
    let mut adapter = mock_adapter();
    adapter.expect_start_hotspot().times(1).returning(|_| Ok(true));
    adapter.expect_start_bridge().never();
    let core = core_with(adapter, ExtensionRegistry::new());

    let first = wifi_hotspot("First", "testpass1");
    assert!(core.start(first.clone()).await.unwrap());

    let second = SharingConfig::new(NetworkMode::Bridge, eth0(), wlan0());
    let err = core.start(second).await.unwrap_err();
    match err {
        FantasmaError::AlreadyActive { mode, source_interface, target_interface } => {
            assert_eq!(mode, "hotspot");
            assert_eq!(source_interface, "eth0");
            assert_eq!(target_interface, "wlan0");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(core.config().await, Some(first));
}

#[tokio::test]
async fn test_invalid_config_rejected_while_active() {
    let mut adapter = mock_adapter();
    adapter.expect_start_hotspot().times(1).returning(|_| Ok(true));
    let core = core_with(adapter, ExtensionRegistry::new());

    let first = wifi_hotspot("First", "testpass1");
    assert!(core.start(first.clone()).await.unwrap());

    let err = assert_err!(core.start(wifi_hotspot("Second", "")).await);
    assert!(matches!(err, FantasmaError::Validation(_)));
    assert_eq!(core.config().await, Some(first));
}

#[tokio::test]
async fn test_stop_when_inactive() {
    let mut adapter = mock_adapter();
    adapter.expect_stop_sharing().never();
    let core = core_with(adapter, ExtensionRegistry::new());

    assert!(core.stop().await);
    assert!(!core.is_active().await);
    assert!(core.get_status().await.config.is_none());
}

#[tokio::test]
async fn test_bridge_lifecycle() {
    let mut adapter = mock_adapter();
    adapter.expect_start_bridge().times(1).returning(|_| Ok(true));
    adapter.expect_stop_sharing().times(1).returning(|| Ok(true));
    let core = core_with(adapter, ExtensionRegistry::new());

    let config = SharingConfig::new(NetworkMode::Bridge, eth0(), wlan0());
    assert!(core.start(config.clone()).await.unwrap());
    let status = core.get_status().await;
    assert!(status.active);
    assert_eq!(status.config, Some(config));

    assert!(core.stop().await);
    let status = core.get_status().await;
    assert!(!status.active);
    assert!(status.config.is_none());
    assert!(status.session_id.is_none());
}

#[tokio::test]
async fn test_failed_stop_keeps_session() {
    let mut adapter = mock_adapter();
    adapter.expect_start_bridge().returning(|_| Ok(true));
    adapter.expect_stop_sharing().times(1).returning(|| Ok(false));
    let core = core_with(adapter, ExtensionRegistry::new());

    core.start(SharingConfig::new(NetworkMode::Bridge, eth0(), wlan0()))
        .await
        .unwrap();
    assert!(!core.stop().await);
    assert!(core.is_active().await);
}

#[tokio::test]
async fn test_adapter_error_becomes_false() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();
    let mut registry = ExtensionRegistry::new();
    registry.register_hook(
        HookEvent::OnError,
        hook(move |ctx| {
            seen.lock().unwrap().push(ctx.error.clone().unwrap_or_default());
            Ok(())
        }),
    );

    let mut adapter = mock_adapter();
    adapter.expect_start_hotspot().times(1).returning(|_| {
        Err(FantasmaError::ToolInvocation {
            cmd: "hostapd".to_string(),
            code: Some(1),
            stderr: "nl80211 not found".to_string(),
        })
    });
    let core = core_with(adapter, registry);

    assert!(!core.start(wifi_hotspot("Test", "testpass1")).await.unwrap());
    assert!(!core.is_active().await);

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("hostapd"));
}

#[tokio::test]
async fn test_post_start_hooks_run_in_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ExtensionRegistry::new();
    for id in 1..=3 {
        let order = order.clone();
        registry.register_hook(
            HookEvent::PostStart,
            hook(move |ctx| {
                order.lock().unwrap().push(id);
                assert_eq!(ctx.config.as_ref().unwrap().password.as_deref(), Some("********"));
                if id == 2 {
                    anyhow::bail!("hook {} failed", id);
                }
                Ok(())
            }),
        );
    }

    let mut adapter = mock_adapter();
    adapter.expect_start_hotspot().returning(|_| Ok(true));
    adapter.expect_stop_sharing().returning(|| Ok(true));
    let core = core_with(adapter, registry);

    assert!(core.start(wifi_hotspot("Test", "testpass1")).await.unwrap());
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);

    assert!(core.stop().await);
    assert!(core.start(wifi_hotspot("Test", "testpass1")).await.unwrap());
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 1, 2, 3]);
}

#[tokio::test]
async fn test_custom_validator_blocks_start() {
    fn no_guest_wifi(config: &SharingConfig) -> Result<(), String> {
        if config.ssid.as_deref() == Some("guest") {
            return Err("guest network is disabled".to_string());
        }
        Ok(())
    }

    let mut registry = ExtensionRegistry::new();
    registry.register_validator("no-guest", no_guest_wifi);

    let mut adapter = mock_adapter();
    adapter.expect_start_hotspot().times(1).returning(|_| Ok(true));
    let core = core_with(adapter, registry);

    let err = core.start(wifi_hotspot("guest", "testpass1")).await.unwrap_err();
    assert!(err.to_string().contains("guest network is disabled"));
    assert!(core.start(wifi_hotspot("home", "testpass1")).await.unwrap());
}

#[tokio::test]
async fn test_session_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("session.json"));

    let mut adapter = mock_adapter();
    adapter.expect_start_bridge().returning(|_| Ok(true));
    let core = core_with(adapter, ExtensionRegistry::new())
        .with_session_store(store.clone())
        .await
        .unwrap();
    core.start(SharingConfig::new(NetworkMode::Bridge, eth0(), wlan0()))
        .await
        .unwrap();
    let started = core.get_status().await;

    let mut adapter = mock_adapter();
    adapter.expect_stop_sharing().times(1).returning(|| Ok(true));
    let resumed = core_with(adapter, ExtensionRegistry::new())
        .with_session_store(store.clone())
        .await
        .unwrap();

    let status = resumed.get_status().await;
    assert!(status.active);
    assert_eq!(status.session_id, started.session_id);
    assert_eq!(status.mode, Some(NetworkMode::Bridge));

    assert!(resumed.stop().await);
    assert!(store.load().await.unwrap().is_none());
}
