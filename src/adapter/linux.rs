//! Linux backend
//!
//! hostapd + dnsmasq + iptables for hotspot mode, brctl or `ip link` for
//! bridge mode.

use super::{status_map, PlatformAdapter, StatusMap};
use crate::config::Settings;
use crate::dhcp::{self, DhcpConfig};
use crate::error::FantasmaResult;
use crate::firewall;
use crate::hostapd::{self, AccessPointConfig};
use crate::interface::{self, NetworkInterface, SharingConfig};
use crate::tool::{Elevation, ShellTool};
use crate::validation;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info, warn};

const IP_FORWARD_PATH: &str = "/proc/sys/net/ipv4/ip_forward";
const VIRTUAL_PREFIX: &str = "vir";

pub struct LinuxAdapter {
    tool: ShellTool,
    bridge_name: String,
    runtime_dir: PathBuf,
    dns_servers: Vec<String>,
    lease_time: String,
    country_code: String,
}

/// Factory for the adapter registry
pub fn create_adapter(settings: &Settings) -> Box<dyn PlatformAdapter> {
    Box::new(LinuxAdapter::new(settings))
}

impl LinuxAdapter {
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
            bridge_name: settings.network.linux_bridge.clone(),
            runtime_dir: settings.paths.runtime_dir.clone(),
            dns_servers: settings.network.dns_servers.clone(),
            lease_time: settings.network.lease_time.clone(),
            country_code: settings.network.country_code.clone(),
        }
    }

    async fn mac_address(&self, name: &str) -> Option<String> {
        self.tool
            .read_file(&format!("/sys/class/net/{}/address", name))
            .await
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    async fn hotspot_steps(&self, config: &SharingConfig) -> FantasmaResult<()> {
        let source = config.source_interface.name.as_str();
        let target = config.target_interface.name.as_str();
        validation::validate_interface_name(source)?;
        validation::validate_interface_name(target)?;

        // Only the gateway address on the target
        let (gateway, prefix) = config.gateway()?;
        let address = format!("{}/{}", gateway, prefix);
        self.tool.try_privileged("ip", &["addr", "flush", "dev", target]).await;
        self.tool
            .privileged("ip", &["addr", "add", address.as_str(), "dev", target])
            .await?;
        self.tool.privileged("ip", &["link", "set", target, "up"]).await?;

        let dhcp = DhcpConfig::for_session(config, &self.dns_servers, &self.lease_time)?;
        let dnsmasq_conf = dhcp::write_config(&self.runtime_dir, &dhcp).await?;
        let dnsmasq_conf = dnsmasq_conf.to_string_lossy().into_owned();
        self.tool
            .spawn_privileged("dnsmasq", &["-C", dnsmasq_conf.as_str(), "-k"])
            .await?;
        info!("dnsmasq serving {}-{} on {}", dhcp.range_start, dhcp.range_end, target);

        if config.needs_access_point() {
            let ap = AccessPointConfig::for_session(config, &self.country_code)?;
            let hostapd_conf = hostapd::write_config(&self.runtime_dir, &ap).await?;
            let hostapd_conf = hostapd_conf.to_string_lossy().into_owned();
            self.tool.spawn_privileged("hostapd", &[hostapd_conf.as_str()]).await?;
            info!("hostapd started for SSID '{}' on channel {}", ap.ssid, ap.channel);
        }

        self.tool.privileged("sysctl", &["-w", "net.ipv4.ip_forward=1"]).await?;
        firewall::enable_nat(&self.tool, source, target).await
    }

    async fn bridge_with_brctl(&self, source: &str, target: &str) -> FantasmaResult<()> {
        let bridge = self.bridge_name.as_str();
        // Fails when the bridge already exists
        self.tool.try_privileged("brctl", &["addbr", bridge]).await;
        self.tool.privileged("brctl", &["addif", bridge, source]).await?;
        self.tool.privileged("brctl", &["addif", bridge, target]).await?;
        self.tool.privileged("ip", &["link", "set", bridge, "up"]).await?;
        info!("Bridge {} created with brctl", bridge);
        Ok(())
    }

    async fn bridge_with_ip(&self, source: &str, target: &str) -> FantasmaResult<()> {
        let bridge = self.bridge_name.as_str();
        self.tool
            .try_privileged("ip", &["link", "add", "name", bridge, "type", "bridge"])
            .await;
        self.tool.privileged("ip", &["link", "set", source, "master", bridge]).await?;
        self.tool.privileged("ip", &["link", "set", target, "master", bridge]).await?;
        self.tool.privileged("ip", &["link", "set", bridge, "up"]).await?;
        info!("Bridge {} created with ip", bridge);
        Ok(())
    }

    async fn remove_bridge(&self, has_brctl: bool) {
        let bridge = self.bridge_name.as_str();
        if has_brctl {
            self.tool.try_privileged("ip", &["link", "set", bridge, "down"]).await;
            self.tool.try_privileged("brctl", &["delbr", bridge]).await;
        } else {
            self.tool.try_privileged("ip", &["link", "delete", bridge]).await;
        }
    }
}

#[async_trait]
impl PlatformAdapter for LinuxAdapter {
    fn name(&self) -> &str {
        "Linux"
    }

    async fn detect_interfaces(&self) -> Vec<NetworkInterface> {
        let output = match self.tool.run("ip", &["link", "show"]).await {
            Ok(output) => output,
            Err(e) => {
                error!("Error detecting interfaces: {}", e);
                return Vec::new();
            }
        };

        let mut interfaces = Vec::new();
        for link in interface::parse_ip_link(&output.stdout) {
            if interface::is_excluded(&link.name, Some(VIRTUAL_PREFIX)) {
                continue;
            }
            let kind = interface::classify_linux_interface(&link.name);
            let mac = match self.mac_address(&link.name).await {
                Some(mac) => Some(mac),
                None => link.mac_address.clone(),
            };
            interfaces.push(
                NetworkInterface::new(link.name.clone(), kind)
                    .with_mac(mac)
                    .active(link.is_up()),
            );
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
                info!("Hotspot mode started successfully");
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
        info!("Starting bridge mode: {} <-> {}", source, target);

        if let Err(e) = validation::validate_interface_name(source)
            .and_then(|_| validation::validate_interface_name(target))
        {
            error!("Error starting bridge: {}", e);
            return Ok(false);
        }

        let has_brctl = self.tool.has_command("brctl").await;
        let result = if has_brctl {
            self.bridge_with_brctl(source, target).await
        } else {
            self.bridge_with_ip(source, target).await
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                error!("Error starting bridge: {}", e);
                self.remove_bridge(has_brctl).await;
                Ok(false)
            }
        }
    }

    async fn stop_sharing(&self) -> FantasmaResult<bool> {
        info!("Stopping network sharing");

        self.tool.try_privileged("killall", &["hostapd"]).await;
        self.tool.try_privileged("killall", &["dnsmasq"]).await;
        firewall::flush(&self.tool).await;

        let has_brctl = self.tool.has_command("brctl").await;
        self.remove_bridge(has_brctl).await;

        if !self.tool.try_privileged("sysctl", &["-w", "net.ipv4.ip_forward=0"]).await {
            warn!("Could not disable IP forwarding");
        }

        info!("Network sharing stopped");
        Ok(true)
    }

    async fn get_status(&self) -> StatusMap {
        let bridge_args = ["link", "show", self.bridge_name.as_str()];
        let (hostapd, dnsmasq, bridge, forward) = futures::join!(
            self.tool.succeeds("pgrep", &["hostapd"]),
            self.tool.succeeds("pgrep", &["dnsmasq"]),
            self.tool.succeeds("ip", &bridge_args),
            self.tool.read_file(IP_FORWARD_PATH),
        );

        status_map([
            ("platform", Value::from("Linux")),
            ("hostapd_running", Value::from(hostapd)),
            ("dnsmasq_running", Value::from(dnsmasq)),
            ("bridge_active", Value::from(bridge)),
            (
                "ip_forward_enabled",
                Value::from(forward.map(|v| v.trim() == "1").unwrap_or(false)),
            ),
        ])
    }

    async fn is_supported(&self) -> bool {
        cfg!(target_os = "linux")
    }
}
