//! macOS backend
//!
//! Internet Sharing (defaults/launchctl) with a pf NAT anchor for hotspot
//! mode, `ifconfig bridgeN` for bridge mode. The WiFi access point itself
//! cannot be created from the command line; the Sharing pane is opened
//! instead.

use super::{status_map, PlatformAdapter, StatusMap};
use crate::config::Settings;
use crate::error::FantasmaResult;
use crate::interface::{ConnectionType, NetworkInterface, SharingConfig};
use crate::tool::{Elevation, ShellTool};
use crate::validation;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info, warn};

const NAT_PREFERENCES: &str = "/Library/Preferences/SystemConfiguration/com.apple.nat";
const SHARING_DAEMON: &str = "/System/Library/LaunchDaemons/com.apple.InternetSharing.plist";
const SHARING_PANE: &str = "x-apple.systempreferences:com.apple.Sharing-Settings.extension?Sharing";
const PF_ANCHOR: &str = "com.fantasma";

pub struct MacOSAdapter {
    tool: ShellTool,
    bridge_name: String,
    runtime_dir: PathBuf,
}

/// Factory for the adapter registry
pub fn create_adapter(settings: &Settings) -> Box<dyn PlatformAdapter> {
    Box::new(MacOSAdapter::new(settings))
}

/// Parse `networksetup -listallhardwareports` into device names and types
///
/// ```text
/// Hardware Port: Wi-Fi
/// Device: en0
/// Ethernet Address: a4:83:e7:01:02:03
/// ```
pub fn parse_hardware_ports(output: &str) -> Vec<(String, ConnectionType)> {
    let mut ports = Vec::new();
    let mut current: Option<ConnectionType> = None;

    for line in output.lines() {
        if let Some(port) = line.strip_prefix("Hardware Port:") {
            current = Some(classify_port(port.trim()));
        } else if let Some(device) = line.strip_prefix("Device:") {
            if let Some(kind) = current.take() {
                ports.push((device.trim().to_string(), kind));
            }
        }
    }

    ports
}

fn classify_port(port: &str) -> ConnectionType {
    if port.contains("Wi-Fi") || port.contains("AirPort") {
        ConnectionType::Wifi
    } else if port.contains("Bluetooth") {
        ConnectionType::Bluetooth
    } else if port.contains("Ethernet") {
        ConnectionType::Ethernet
    } else if port.contains("USB") || port.contains("iPhone") {
        ConnectionType::Usb
    } else {
        ConnectionType::Ethernet
    }
}

/// Guess the type of a BSD device name that `networksetup` did not list
///
/// `en0` is the built-in Wi-Fi port on portables; other `en` devices are wired.
pub fn classify_macos_interface(name: &str) -> ConnectionType {
    if name == "en0" || name.starts_with("awdl") || name.starts_with("llw") {
        ConnectionType::Wifi
    } else if name.starts_with("bnep") {
        ConnectionType::Bluetooth
    } else {
        ConnectionType::Ethernet
    }
}

/// MAC address and activity from `ifconfig <dev>` output
fn parse_ifconfig(output: &str) -> (Option<String>, bool) {
    let mac = output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("ether "))
        .find_map(|rest| rest.split_whitespace().next())
        .map(str::to_string);
    let active = output.contains("status: active") || output.contains("inet ");
    (mac, active)
}

impl MacOSAdapter {
    pub fn new(settings: &Settings) -> Self {
        let elevation = if settings.privileges.use_sudo {
            Elevation::sudo_unless_root()
        } else {
            Elevation::None
        };
        Self::with_tool(ShellTool::system(elevation), settings)
    }

    pub fn with_tool(tool: ShellTool, settings: &Settings) -> Self {
        Self {
            tool,
            bridge_name: settings.network.macos_bridge.clone(),
            runtime_dir: settings.paths.runtime_dir.clone(),
        }
    }

    async fn open_sharing_preferences(&self) {
        if !self.tool.succeeds("open", &[SHARING_PANE]).await {
            warn!("Could not open the Sharing preferences pane");
        }
    }

    async fn hotspot_steps(&self, config: &SharingConfig) -> FantasmaResult<()> {
        let source = config.source_interface.name.as_str();
        let target = config.target_interface.name.as_str();
        validation::validate_interface_name(source)?;
        validation::validate_interface_name(target)?;

        self.tool
            .try_privileged(
                "defaults",
                &["write", NAT_PREFERENCES, "NAT", "-dict-add", "Enabled", "-int", "1"],
            )
            .await;

        let (gateway, prefix) = config.gateway()?;
        let (network, _) = validation::parse_ipv4_cidr(&config.ip_range)?;
        let gateway = gateway.to_string();
        let netmask = validation::prefix_to_netmask(prefix).to_string();
        self.tool
            .privileged("ifconfig", &[target, "inet", gateway.as_str(), "netmask", netmask.as_str(), "up"])
            .await?;

        self.tool.privileged("sysctl", &["-w", "net.inet.ip.forwarding=1"]).await?;

        let rules = format!("nat on {} from {}/{} to any -> ({})\n", source, network, prefix, source);
        tokio::fs::create_dir_all(&self.runtime_dir).await?;
        let anchor_file = self.runtime_dir.join("pf-nat.conf");
        tokio::fs::write(&anchor_file, rules).await?;
        let anchor_file = anchor_file.to_string_lossy().into_owned();
        self.tool
            .privileged("pfctl", &["-a", PF_ANCHOR, "-f", anchor_file.as_str()])
            .await?;
        // Already enabled is reported as an error
        self.tool.try_privileged("pfctl", &["-E"]).await;

        self.tool.try_privileged("launchctl", &["load", "-w", SHARING_DAEMON]).await;

        match config.target_interface.kind {
            ConnectionType::Wifi => {
                if let Some(ref ssid) = config.ssid {
                    info!("Configuring WiFi: SSID={}", ssid);
                }
                warn!("WiFi access point must be confirmed in System Settings > Sharing");
                self.open_sharing_preferences().await;
            }
            ConnectionType::Usb | ConnectionType::Bluetooth => {
                self.open_sharing_preferences().await;
            }
            ConnectionType::Ethernet => {}
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformAdapter for MacOSAdapter {
    fn name(&self) -> &str {
        "macOS"
    }

    async fn detect_interfaces(&self) -> Vec<NetworkInterface> {
        let output = match self.tool.run("networksetup", &["-listallhardwareports"]).await {
            Ok(output) => output,
            Err(e) => {
                error!("Error detecting interfaces: {}", e);
                return Vec::new();
            }
        };

        let mut interfaces = Vec::new();
        for (device, kind) in parse_hardware_ports(&output.stdout) {
            let (mac, active) = match self.tool.output("ifconfig", &[device.as_str()]).await {
                Ok(out) => parse_ifconfig(&out.stdout),
                Err(_) => (None, false),
            };
            interfaces.push(NetworkInterface::new(device, kind).with_mac(mac).active(active));
        }

        info!("Detected {} interfaces", interfaces.len());
        interfaces
    }

    async fn start_hotspot(&self, config: &SharingConfig) -> FantasmaResult<bool> {
        info!(
            "Starting hotspot mode: {} -> {}",
            config.source_interface.name, config.target_interface.name
        );

        match self.hotspot_steps(config).await {
            Ok(()) => {
                info!("Hotspot mode started (may require manual confirmation)");
                Ok(true)
            }
            Err(e) => {
                error!("Error starting hotspot: {}", e);
                self.stop_sharing().await?;
                Ok(false)
            }
        }
    }

    async fn start_bridge(&self, config: &SharingConfig) -> FantasmaResult<bool> {
        let source = config.source_interface.name.as_str();
        let target = config.target_interface.name.as_str();
        let bridge = self.bridge_name.as_str();
        info!("Starting bridge mode: {} <-> {}", source, target);

        if let Err(e) = validation::validate_interface_name(source)
            .and_then(|_| validation::validate_interface_name(target))
        {
            error!("Error starting bridge: {}", e);
            return Ok(false);
        }

        // May already exist
        self.tool.try_privileged("ifconfig", &[bridge, "create"]).await;

        let attached = async {
            self.tool.privileged("ifconfig", &[bridge, "addm", source]).await?;
            self.tool.privileged("ifconfig", &[bridge, "addm", target]).await?;
            self.tool.privileged("ifconfig", &[bridge, "up"]).await
        };

        match attached.await {
            Ok(_) => {
                info!("Bridge mode started successfully");
                Ok(true)
            }
            Err(e) => {
                error!("Error starting bridge: {}", e);
                self.tool.try_privileged("ifconfig", &[bridge, "destroy"]).await;
                Ok(false)
            }
        }
    }

    async fn stop_sharing(&self) -> FantasmaResult<bool> {
        info!("Stopping network sharing");

        self.tool.try_privileged("launchctl", &["unload", "-w", SHARING_DAEMON]).await;
        self.tool.try_privileged("pfctl", &["-a", PF_ANCHOR, "-F", "all"]).await;
        self.tool.try_privileged("sysctl", &["-w", "net.inet.ip.forwarding=0"]).await;
        self.tool
            .try_privileged("ifconfig", &[self.bridge_name.as_str(), "destroy"])
            .await;

        info!("Network sharing stopped");
        Ok(true)
    }

    async fn get_status(&self) -> StatusMap {
        let bridge_args = [self.bridge_name.as_str()];
        let (sharing, bridge, forwarding) = futures::join!(
            self.tool.output("launchctl", &["list"]),
            self.tool.output("ifconfig", &bridge_args),
            self.tool.output("sysctl", &["-n", "net.inet.ip.forwarding"]),
        );

        let sharing = sharing
            .map(|o| o.stdout.contains("InternetSharing"))
            .unwrap_or(false);
        let bridge = bridge
            .map(|o| o.success() && o.stdout.contains("UP"))
            .unwrap_or(false);
        let forwarding = forwarding
            .map(|o| o.success() && o.stdout.trim() == "1")
            .unwrap_or(false);

        status_map([
            ("platform", Value::from("macOS")),
            ("internet_sharing_active", Value::from(sharing)),
            ("bridge_active", Value::from(bridge)),
            ("ip_forward_enabled", Value::from(forwarding)),
        ])
    }

    async fn is_supported(&self) -> bool {
        cfg!(target_os = "macos")
    }
}
