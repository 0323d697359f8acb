//! Android (Termux) backend
//!
//! Everything privileged goes through `su -c`, which hands a single string to
//! a shell. Interface names are therefore validated strictly before any
//! command is built.
//!
//! Many Android kernels ship without the bridge module; bridge mode then
//! degrades to an L3 proxy (forwarding + NAT).

use super::{status_map, PlatformAdapter, StatusMap};
use crate::config::Settings;
use crate::error::{FantasmaError, FantasmaResult};
use crate::firewall;
use crate::interface::{self, ConnectionType, NetworkInterface, SharingConfig};
use crate::tool::{Elevation, ShellTool};
use crate::validation;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info, warn};

const ROOT_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TermuxAdapter {
    tool: ShellTool,
    bridge_name: String,
}

/// Factory for the adapter registry
pub fn create_adapter(settings: &Settings) -> Box<dyn PlatformAdapter> {
    Box::new(TermuxAdapter::new(settings))
}

/// Classify an Android interface name
pub fn classify_android_interface(name: &str) -> ConnectionType {
    if name.starts_with("wlan") {
        ConnectionType::Wifi
    } else if name.starts_with("rmnet") || name.starts_with("ccmni") {
        // Mobile data
        ConnectionType::Ethernet
    } else if name.starts_with("rndis") || name.contains("usb") {
        ConnectionType::Usb
    } else if name.starts_with("bt-pan") {
        ConnectionType::Bluetooth
    } else {
        ConnectionType::Ethernet
    }
}

fn checked_pair(config: &SharingConfig) -> FantasmaResult<(&str, &str)> {
    let source = config.source_interface.name.as_str();
    let target = config.target_interface.name.as_str();
    validation::validate_interface_name(source)?;
    validation::validate_interface_name(target)?;
    Ok((source, target))
}

impl TermuxAdapter {
    pub fn new(settings: &Settings) -> Self {
        Self::with_tool(ShellTool::system(Elevation::Su), settings)
    }

    pub fn with_tool(tool: ShellTool, settings: &Settings) -> Self {
        Self {
            tool,
            bridge_name: settings.network.android_bridge.clone(),
        }
    }

    /// `su -c id` reports uid 0 within two seconds
    async fn has_root(&self) -> bool {
        match self.tool.output_with_timeout("su", &["-c", "id"], ROOT_CHECK_TIMEOUT).await {
            Ok(output) => output.stdout.contains("uid=0"),
            Err(_) => false,
        }
    }

    async fn has_termux_api(&self) -> bool {
        self.tool.has_command("termux-wifi-enable").await
    }

    async fn has_bridge_support(&self) -> bool {
        self.tool
            .read_file("/proc/modules")
            .await
            .is_some_and(|modules| modules.contains("bridge"))
    }

    fn manual_hotspot(&self, config: &SharingConfig) {
        info!("Using termux-api for tethering");
        warn!("Please enable WiFi hotspot manually in Android settings:");
        info!("Settings -> Network & Internet -> Hotspot & tethering -> WiFi hotspot");
        if let Some(ref ssid) = config.ssid {
            info!("Configure SSID: {}", ssid);
        }
        if config.password.is_some() {
            info!("Configure the password you supplied");
        }
    }

    async fn svc_hotspot(&self, source: &str, target: &str) -> FantasmaResult<()> {
        info!("Attempting to use svc commands (requires root)");
        self.tool.try_privileged("svc", &["wifi", "enable"]).await;
        warn!("Direct tethering control requires root access");

        if self.has_root().await {
            firewall::enable_nat(&self.tool, source, target).await?;
        } else {
            warn!("No root access, NAT rules not installed");
        }
        Ok(())
    }

    async fn l2_bridge(&self, source: &str, target: &str) -> FantasmaResult<()> {
        let bridge = self.bridge_name.as_str();
        info!("Starting L2 bridge");
        self.tool
            .try_privileged("ip", &["link", "add", "name", bridge, "type", "bridge"])
            .await;
        self.tool.privileged("ip", &["link", "set", source, "master", bridge]).await?;
        self.tool.privileged("ip", &["link", "set", target, "master", bridge]).await?;
        self.tool.privileged("ip", &["link", "set", bridge, "up"]).await?;
        info!("L2 bridge started");
        Ok(())
    }

    async fn l3_proxy(&self, source: &str, target: &str) -> FantasmaResult<()> {
        info!("Starting L3 proxy mode");
        if !self.has_root().await {
            return Err(FantasmaError::PermissionDenied(
                "L3 proxy mode requires root access".to_string(),
            ));
        }
        self.tool.privileged("sysctl", &["-w", "net.ipv4.ip_forward=1"]).await?;
        firewall::enable_nat(&self.tool, source, target).await?;
        info!("L3 proxy mode started");
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for TermuxAdapter {
    fn name(&self) -> &str {
        "Android/Termux"
    }

    async fn detect_interfaces(&self) -> Vec<NetworkInterface> {
        let output = match self.tool.run("ip", &["link", "show"]).await {
            Ok(output) => output,
            Err(e) => {
                error!("Error detecting interfaces: {}", e);
                return Vec::new();
            }
        };

        let interfaces: Vec<NetworkInterface> = interface::parse_ip_link(&output.stdout)
            .into_iter()
            .filter(|link| !interface::is_excluded(&link.name, None))
            .map(|link| {
                let kind = classify_android_interface(&link.name);
                let active = link.is_up();
                NetworkInterface::new(link.name, kind)
                    .with_mac(link.mac_address)
                    .active(active)
            })
            .collect();

        info!("Detected {} interfaces", interfaces.len());
        interfaces
    }

    async fn start_hotspot(&self, config: &SharingConfig) -> FantasmaResult<bool> {
        info!("Starting hotspot mode on Android/Termux");

        let (source, target) = match checked_pair(config) {
            Ok(pair) => pair,
            Err(e) => {
                error!("Error starting hotspot: {}", e);
                return Ok(false);
            }
        };

        if self.has_termux_api().await {
            self.manual_hotspot(config);
            return Ok(true);
        }

        match self.svc_hotspot(source, target).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("Error starting hotspot: {}", e);
                self.stop_sharing().await?;
                Ok(false)
            }
        }
    }

    async fn start_bridge(&self, config: &SharingConfig) -> FantasmaResult<bool> {
        info!("Starting bridge/proxy mode on Android");

        let (source, target) = match checked_pair(config) {
            Ok(pair) => pair,
            Err(e) => {
                error!("Error starting bridge: {}", e);
                return Ok(false);
            }
        };

        if self.has_bridge_support().await {
            if let Err(e) = self.l2_bridge(source, target).await {
                error!("Error starting L2 bridge: {}", e);
                self.tool
                    .try_privileged("ip", &["link", "delete", self.bridge_name.as_str()])
                    .await;
                return Ok(false);
            }
            return Ok(true);
        }

        warn!("Kernel doesn't support L2 bridging, using L3 proxy mode");
        match self.l3_proxy(source, target).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("Error starting L3 proxy: {}", e);
                self.stop_sharing().await?;
                Ok(false)
            }
        }
    }

    async fn stop_sharing(&self) -> FantasmaResult<bool> {
        info!("Stopping network sharing");

        if self.has_root().await {
            firewall::flush(&self.tool).await;
            self.tool
                .try_privileged("ip", &["link", "delete", self.bridge_name.as_str()])
                .await;
        } else {
            warn!("No root access, nothing to tear down");
        }

        info!("Network sharing stopped");
        Ok(true)
    }

    async fn get_status(&self) -> StatusMap {
        let (root, api, bridge) = futures::join!(
            self.has_root(),
            self.has_termux_api(),
            self.has_bridge_support(),
        );

        status_map([
            ("platform", Value::from("Android/Termux")),
            ("has_root", Value::from(root)),
            ("has_termux_api", Value::from(api)),
            ("bridge_support", Value::from(bridge)),
        ])
    }

    async fn is_supported(&self) -> bool {
        self.tool
            .read_file("/proc/version")
            .await
            .is_some_and(|version| version.to_ascii_lowercase().contains("android"))
    }
}
