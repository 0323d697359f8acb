//! Windows backend
//!
//! WiFi hotspots use the `netsh wlan` hosted network. Internet Connection
//! Sharing and bridging have no supported command-line interface, so those
//! paths open Network Connections and log the manual steps.

use super::{status_map, PlatformAdapter, StatusMap};
use crate::config::Settings;
use crate::error::{FantasmaError, FantasmaResult};
use crate::interface::{ConnectionType, NetworkInterface, SharingConfig};
use crate::tool::{Elevation, ShellTool};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

pub struct WindowsAdapter {
    tool: ShellTool,
}

/// Factory for the adapter registry
pub fn create_adapter(_settings: &Settings) -> Box<dyn PlatformAdapter> {
    Box::new(WindowsAdapter::new())
}

/// Parse `netsh interface show interface`
///
/// ```text
/// Admin State    State          Type             Interface Name
/// -------------------------------------------------------------------------
/// Enabled        Connected      Dedicated        Wi-Fi
/// ```
///
/// The first three lines (blank, header, ruler) are skipped.
pub fn parse_interface_table(output: &str) -> Vec<NetworkInterface> {
    output
        .lines()
        .skip(3)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return None;
            }
            let name = parts[3..].join(" ");
            let kind = classify(&name, parts[2]);
            Some(NetworkInterface::new(name, kind).active(parts[1].eq_ignore_ascii_case("connected")))
        })
        .collect()
}

/// Guess the type of a connection from its name alone
pub fn classify_windows_interface(name: &str) -> ConnectionType {
    classify(name, "")
}

fn classify(name: &str, type_str: &str) -> ConnectionType {
    let name = name.to_ascii_lowercase();
    let type_str = type_str.to_ascii_lowercase();

    if name.contains("wi-fi") || name.contains("wireless") || type_str.contains("wlan") {
        ConnectionType::Wifi
    } else if name.contains("bluetooth") {
        ConnectionType::Bluetooth
    } else if name.contains("usb") || name.contains("rndis") {
        ConnectionType::Usb
    } else {
        ConnectionType::Ethernet
    }
}

/// Value of the `Status` line of `netsh wlan show hostednetwork`
fn hosted_network_status(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.trim_start().starts_with("Status"))
        .and_then(|l| l.rsplit(':').next())
        .map(|s| s.trim().to_string())
}

impl WindowsAdapter {
    pub fn new() -> Self {
        Self::with_tool(ShellTool::system(Elevation::None))
    }

    pub fn with_tool(tool: ShellTool) -> Self {
        Self { tool }
    }

    async fn open_network_connections(&self) {
        if !self.tool.succeeds("control", &["ncpa.cpl"]).await {
            warn!("Could not open Network Connections");
        }
    }

    async fn start_hosted_network(&self, config: &SharingConfig) -> FantasmaResult<()> {
        let (ssid, password) = match (&config.ssid, &config.password) {
            (Some(ssid), Some(password)) => (ssid, password),
            _ => {
                return Err(FantasmaError::Validation(
                    "WiFi hotspot requires SSID and password".to_string(),
                ))
            }
        };

        let ssid_arg = format!("ssid={}", ssid);
        let key_arg = format!("key={}", password);
        self.tool
            .privileged_quiet(
                "netsh",
                &["wlan", "set", "hostednetwork", "mode=allow", ssid_arg.as_str(), key_arg.as_str()],
            )
            .await?;
        self.tool.privileged("netsh", &["wlan", "start", "hostednetwork"]).await?;
        Ok(())
    }

    async fn start_ics(&self, config: &SharingConfig) {
        warn!("ICS configuration on Windows requires administrator privileges");
        info!("Please enable Internet Connection Sharing manually:");
        info!("1. Open Network Connections (ncpa.cpl)");
        info!("2. Right-click on {}", config.source_interface.name);
        info!("3. Properties -> Sharing tab");
        info!("4. Check 'Allow other network users...'");
        info!("5. Select {}", config.target_interface.name);
        self.open_network_connections().await;
    }
}

impl Default for WindowsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for WindowsAdapter {
    fn name(&self) -> &str {
        "Windows"
    }

    async fn detect_interfaces(&self) -> Vec<NetworkInterface> {
        match self.tool.run("netsh", &["interface", "show", "interface"]).await {
            Ok(output) => {
                let interfaces = parse_interface_table(&output.stdout);
                info!("Detected {} interfaces", interfaces.len());
                interfaces
            }
            Err(e) => {
                error!("Error detecting interfaces: {}", e);
                Vec::new()
            }
        }
    }

    async fn start_hotspot(&self, config: &SharingConfig) -> FantasmaResult<bool> {
        info!(
            "Starting hotspot mode: {} -> {}",
            config.source_interface.name, config.target_interface.name
        );

        if !config.needs_access_point() {
            self.start_ics(config).await;
            return Ok(true);
        }

        match self.start_hosted_network(config).await {
            Ok(()) => {
                info!("WiFi hotspot started");
                warn!("Note: You may need to enable ICS manually in Network Connections");
                Ok(true)
            }
            Err(e) => {
                error!("Error starting WiFi hotspot: {}", e);
                self.stop_sharing().await?;
                Ok(false)
            }
        }
    }

    async fn start_bridge(&self, config: &SharingConfig) -> FantasmaResult<bool> {
        info!(
            "Starting bridge mode: {} <-> {}",
            config.source_interface.name, config.target_interface.name
        );

        warn!("Bridge mode on Windows requires manual configuration:");
        info!("1. Open Network Connections (ncpa.cpl)");
        info!(
            "2. Select {} and {}",
            config.source_interface.name, config.target_interface.name
        );
        info!("3. Right-click and choose 'Bridge Connections'");
        self.open_network_connections().await;
        Ok(true)
    }

    async fn stop_sharing(&self) -> FantasmaResult<bool> {
        info!("Stopping network sharing");
        self.tool.try_privileged("netsh", &["wlan", "stop", "hostednetwork"]).await;
        info!("Network sharing stopped");
        warn!("Note: ICS may need to be disabled manually");
        Ok(true)
    }

    async fn get_status(&self) -> StatusMap {
        let hosted = match self.tool.output("netsh", &["wlan", "show", "hostednetwork"]).await {
            Ok(output) => hosted_network_status(&output.stdout),
            Err(_) => None,
        };

        status_map([
            ("platform", Value::from("Windows")),
            (
                "hosted_network_status",
                Value::from(hosted.unwrap_or_else(|| "unknown".to_string())),
            ),
        ])
    }

    async fn is_supported(&self) -> bool {
        cfg!(target_os = "windows")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::NetworkMode;
    use crate::tool::testing::FakeRunner;
    use crate::tool::CommandOutput;

    const INTERFACE_TABLE: &str = "
Admin State    State          Type             Interface Name
-------------------------------------------------------------------------
Enabled        Connected      Dedicated        Ethernet
Enabled        Disconnected   Dedicated        Wi-Fi
Enabled        Disconnected   Dedicated        Bluetooth Network Connection
Enabled        Connected      Dedicated        Remote NDIS USB Device

";

    const HOSTED_NETWORK: &str = "
Hosted network settings
-----------------------
    Mode                   : Allowed
    SSID name              : \"Test\"

Hosted network status
---------------------
    Status                 : Started
";

    fn hotspot(target: NetworkInterface) -> SharingConfig {
        SharingConfig::new(
            NetworkMode::Hotspot,
            NetworkInterface::new("Ethernet", ConnectionType::Ethernet),
            target,
        )
        .with_credentials("Test", "testpass1")
    }

    #[test]
    fn test_parse_interface_table() {
        let interfaces = parse_interface_table(INTERFACE_TABLE);
        assert_eq!(interfaces.len(), 4);
        assert_eq!(interfaces[0], NetworkInterface::new("Ethernet", ConnectionType::Ethernet).active(true));
        assert_eq!(interfaces[1], NetworkInterface::new("Wi-Fi", ConnectionType::Wifi));
        assert_eq!(interfaces[2].name, "Bluetooth Network Connection");
        assert_eq!(interfaces[2].kind, ConnectionType::Bluetooth);
        assert_eq!(interfaces[3].kind, ConnectionType::Usb);
    }

    #[tokio::test]
    async fn test_hosted_network_hotspot() {
        let runner = FakeRunner::new();
        let adapter = WindowsAdapter::with_tool(ShellTool::new(runner.clone(), Elevation::None));

        let config = hotspot(NetworkInterface::new("Wi-Fi", ConnectionType::Wifi));
        assert!(adapter.start_hotspot(&config).await.unwrap());
        assert_eq!(
            runner.calls(),
            vec![
                "netsh wlan set hostednetwork mode=allow ssid=Test key=testpass1",
                "netsh wlan start hostednetwork",
            ]
        );
    }

    #[tokio::test]
    async fn test_hosted_network_failure_stops() {
        let runner = FakeRunner::new();
        runner.fail("netsh wlan start");
        let adapter = WindowsAdapter::with_tool(ShellTool::new(runner.clone(), Elevation::None));

        let config = hotspot(NetworkInterface::new("Wi-Fi", ConnectionType::Wifi));
        assert!(!adapter.start_hotspot(&config).await.unwrap());
        assert!(runner.called("netsh wlan stop hostednetwork"));
    }

    #[tokio::test]
    async fn test_ics_and_bridge_are_manual() {
        let runner = FakeRunner::new();
        let adapter = WindowsAdapter::with_tool(ShellTool::new(runner.clone(), Elevation::None));

        let config = hotspot(NetworkInterface::new("Remote NDIS USB Device", ConnectionType::Usb));
        assert!(adapter.start_hotspot(&config).await.unwrap());
        assert_eq!(runner.calls(), vec!["control ncpa.cpl"]);

        let mut bridge = config.clone();
        bridge.mode = NetworkMode::Bridge;
        assert!(adapter.start_bridge(&bridge).await.unwrap());
    }

    #[tokio::test]
    async fn test_status() {
        let runner = FakeRunner::new();
        runner.respond("netsh wlan show hostednetwork", CommandOutput::ok(HOSTED_NETWORK));
        let adapter = WindowsAdapter::with_tool(ShellTool::new(runner, Elevation::None));

        let status = adapter.get_status().await;
        assert_eq!(status["platform"], "Windows");
        assert_eq!(status["hosted_network_status"], "Started");
    }
}
