//! Network interface and sharing configuration model
//!
//! Value types shared by every platform adapter: how an interface is
//! classified, which way traffic is shared, and the configuration of one
//! sharing session.

use crate::error::{FantasmaError, FantasmaResult};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

pub const DEFAULT_IP_RANGE: &str = "192.168.137.0/24";
pub const DEFAULT_DHCP_START: &str = "192.168.137.100";
pub const DEFAULT_DHCP_END: &str = "192.168.137.200";
pub const DEFAULT_CHANNEL: u8 = 7;

/// Physical/link classification of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Usb,
    Bluetooth,
    Wifi,
    Ethernet,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Bluetooth => "bluetooth",
            Self::Wifi => "wifi",
            Self::Ethernet => "ethernet",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionType {
    type Err = FantasmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usb" => Ok(Self::Usb),
            "bluetooth" | "bt" => Ok(Self::Bluetooth),
            "wifi" | "wlan" => Ok(Self::Wifi),
            "ethernet" | "eth" => Ok(Self::Ethernet),
            other => Err(FantasmaError::Parse(format!("Unknown connection type: {}", other))),
        }
    }
}

/// Sharing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// NAT/router mode: own subnet, DHCP, optional access point
    Hotspot,
    /// Layer-2 forwarding: both interfaces join one bridge
    Bridge,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hotspot => "hotspot",
            Self::Bridge => "bridge",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkMode {
    type Err = FantasmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hotspot" | "nat" => Ok(Self::Hotspot),
            "bridge" => Ok(Self::Bridge),
            other => Err(FantasmaError::Parse(format!("Unknown mode: {}", other))),
        }
    }
}

/// One OS network interface as seen by a detection call
///
/// Identity is the name; equality ignores the MAC address so two detection
/// runs over an unchanged system compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConnectionType,
    pub mac_address: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl NetworkInterface {
    pub fn new(name: impl Into<String>, kind: ConnectionType) -> Self {
        Self {
            name: name.into(),
            kind,
            mac_address: None,
            is_active: false,
        }
    }

    pub fn with_mac(mut self, mac: Option<String>) -> Self {
        self.mac_address = mac;
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

impl PartialEq for NetworkInterface {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.is_active == other.is_active
    }
}

impl Eq for NetworkInterface {}

impl fmt::Display for NetworkInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.name,
            self.kind,
            if self.is_active { "up" } else { "down" }
        )
    }
}

/// Configuration of one sharing session
///
/// Built by the caller, validated once, then treated as immutable for the
/// lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingConfig {
    pub mode: NetworkMode,
    /// Interface consuming internet
    pub source_interface: NetworkInterface,
    /// Interface distributing internet
    pub target_interface: NetworkInterface,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_ip_range")]
    pub ip_range: String,
    #[serde(default = "default_dhcp_start")]
    pub dhcp_start: String,
    #[serde(default = "default_dhcp_end")]
    pub dhcp_end: String,
    #[serde(default = "default_channel")]
    pub channel: u8,
}

fn default_ip_range() -> String {
    DEFAULT_IP_RANGE.to_string()
}

fn default_dhcp_start() -> String {
    DEFAULT_DHCP_START.to_string()
}

fn default_dhcp_end() -> String {
    DEFAULT_DHCP_END.to_string()
}

fn default_channel() -> u8 {
    DEFAULT_CHANNEL
}

impl SharingConfig {
    pub fn new(
        mode: NetworkMode,
        source_interface: NetworkInterface,
        target_interface: NetworkInterface,
    ) -> Self {
        Self {
            mode,
            source_interface,
            target_interface,
            ssid: None,
            password: None,
            ip_range: default_ip_range(),
            dhcp_start: default_dhcp_start(),
            dhcp_end: default_dhcp_end(),
            channel: default_channel(),
        }
    }

    pub fn with_credentials(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.ssid = Some(ssid.into());
        self.password = Some(password.into());
        self
    }

    /// Whether a WiFi access point has to be created for this session
    pub fn needs_access_point(&self) -> bool {
        self.mode == NetworkMode::Hotspot && self.target_interface.kind == ConnectionType::Wifi
    }

    /// The single precondition checked before a session may start
    ///
    /// A WiFi hotspot needs both an SSID and a password; every other
    /// combination is accepted regardless of credentials.
    pub fn validate(&self) -> bool {
        if self.needs_access_point() {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
            if missing(&self.ssid) || missing(&self.password) {
                return false;
            }
        }
        true
    }

    /// Gateway address for the target interface: first host of `ip_range`
    pub fn gateway(&self) -> FantasmaResult<(Ipv4Addr, u8)> {
        let (network, prefix) = validation::parse_ipv4_cidr(&self.ip_range)?;
        Ok((Ipv4Addr::from(u32::from(network) + 1), prefix))
    }

    /// Check the addressing plan: DHCP pool inside `ip_range`, ordered, and
    /// not overlapping the gateway
    pub fn check_addressing(&self) -> FantasmaResult<()> {
        let (network, prefix) = validation::parse_ipv4_cidr(&self.ip_range)?;
        let (gateway, _) = self.gateway()?;
        let start = validation::validate_ipv4_address(&self.dhcp_start)?;
        let end = validation::validate_ipv4_address(&self.dhcp_end)?;

        for addr in [start, end] {
            if !validation::ipv4_in_network(addr, network, prefix) {
                return Err(FantasmaError::Validation(format!(
                    "DHCP address {} is outside {}",
                    addr, self.ip_range
                )));
            }
        }
        if u32::from(start) > u32::from(end) {
            return Err(FantasmaError::Validation(format!(
                "DHCP range start {} is after end {}",
                start, end
            )));
        }
        if (u32::from(start)..=u32::from(end)).contains(&u32::from(gateway)) {
            return Err(FantasmaError::Validation(format!(
                "DHCP range {}-{} contains the gateway {}",
                start, end, gateway
            )));
        }
        Ok(())
    }

    /// Switch to another subnet and derive a matching DHCP pool
    ///
    /// Subnets of /24 or larger hand out `.100`-`.200` of the first /24,
    /// smaller ones every host address after the gateway.
    pub fn with_ip_range(mut self, ip_range: &str) -> FantasmaResult<Self> {
        let (network, prefix) = validation::parse_ipv4_cidr(ip_range)?;
        let base = u32::from(network);
        let (start, end) = if prefix <= 24 {
            (base + 100, base + 200)
        } else {
            let size = 1u32 << (32 - prefix);
            (base + 2, base + size - 2)
        };
        self.ip_range = format!("{}/{}", network, prefix);
        self.dhcp_start = Ipv4Addr::from(start).to_string();
        self.dhcp_end = Ipv4Addr::from(end).to_string();
        Ok(self)
    }

    /// Copy safe to print or log
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.password.is_some() {
            copy.password = Some("********".to_string());
        }
        copy
    }
}

/// Classify a Linux interface name
pub fn classify_linux_interface(name: &str) -> ConnectionType {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("wl") {
        ConnectionType::Wifi
    } else if lower.starts_with("eth") || lower.starts_with("en") {
        ConnectionType::Ethernet
    } else if lower.starts_with("usb") || lower.starts_with("rndis") || lower.contains("usb") {
        ConnectionType::Usb
    } else if lower.starts_with("bnep") || lower.starts_with("bt-pan") || lower.contains("bt") {
        ConnectionType::Bluetooth
    } else {
        ConnectionType::Ethernet
    }
}

/// One entry of `ip link show` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub name: String,
    pub flags: Vec<String>,
    pub mac_address: Option<String>,
}

impl LinkEntry {
    pub fn is_up(&self) -> bool {
        self.flags.iter().any(|f| f == "UP")
    }
}

/// Parse `ip link show` output
///
/// Header lines look like `2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ...`
/// followed by an indented `link/ether aa:bb:cc:dd:ee:ff brd ...` line.
/// Names of the form `veth1@if5` are cut at the `@`.
pub fn parse_ip_link(output: &str) -> Vec<LinkEntry> {
    let mut entries: Vec<LinkEntry> = Vec::new();

    for line in output.lines() {
        if line.starts_with(char::is_whitespace) {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("link/ether ") {
                if let Some(entry) = entries.last_mut() {
                    entry.mac_address = rest.split_whitespace().next().map(str::to_string);
                }
            }
            continue;
        }

        let mut parts = line.splitn(3, ": ");
        let index = parts.next().unwrap_or_default();
        if index.trim().parse::<u32>().is_err() {
            continue;
        }
        let (Some(name), Some(rest)) = (parts.next(), parts.next()) else {
            continue;
        };
        let name = name.split('@').next().unwrap_or(name).trim_end_matches(':');

        let flags = rest
            .strip_prefix('<')
            .and_then(|r| r.split_once('>'))
            .map(|(flags, _)| flags.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        entries.push(LinkEntry {
            name: name.to_string(),
            flags,
            mac_address: None,
        });
    }

    entries
}

/// Whether detection should skip an interface
pub fn is_excluded(name: &str, virtual_prefix: Option<&str>) -> bool {
    name == "lo" || virtual_prefix.is_some_and(|prefix| name.starts_with(prefix))
}
