//! Input validation and sanitization
//!
//! Interface names, SSIDs and passphrases end up in generated daemon config
//! files and (on Android) inside `su -c` command strings, so everything coming
//! from a caller goes through here before it touches the OS.

use crate::error::{FantasmaError, FantasmaResult};
use std::net::{IpAddr, Ipv4Addr};

/// IFNAMSIZ minus the trailing NUL
const IFNAME_MAX: usize = 15;

const CONFIG_VALUE_MAX: usize = 255;

const SSID_MAX: usize = 32;

const PASSPHRASE_LEN: std::ops::RangeInclusive<usize> = 8..=63;

fn invalid(message: impl Into<String>) -> FantasmaError {
    FantasmaError::Validation(message.into())
}

/// Interface names are passed as command arguments
///
/// Accepts ASCII letters, digits, `-`, `_` and `.`, at most 15 bytes, not
/// starting with `-` (it would parse as an option).
pub fn validate_interface_name(name: &str) -> FantasmaResult<()> {
    if name.is_empty() || name.len() > IFNAME_MAX {
        return Err(invalid(format!(
            "interface name '{}' must be 1-{} characters",
            name, IFNAME_MAX
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(format!(
            "interface name '{}' contains '{}'",
            name.escape_debug(),
            bad.escape_debug()
        )));
    }
    if name.starts_with('-') {
        return Err(invalid(format!("interface name '{}' starts with '-'", name)));
    }
    Ok(())
}

pub fn validate_ip_address(addr: &str) -> FantasmaResult<IpAddr> {
    addr.parse()
        .map_err(|_| invalid(format!("'{}' is not an IP address", addr)))
}

pub fn validate_ipv4_address(addr: &str) -> FantasmaResult<Ipv4Addr> {
    addr.parse()
        .map_err(|_| invalid(format!("'{}' is not an IPv4 address", addr)))
}

/// Parse an IPv4 network in CIDR notation (`192.168.137.0/24`)
///
/// Returns the network address (host bits cleared) and the prefix length.
pub fn parse_ipv4_cidr(cidr: &str) -> FantasmaResult<(Ipv4Addr, u8)> {
    let (addr, prefix) = cidr.split_once('/').ok_or_else(|| {
        invalid(format!("IP range '{}' is not in address/prefix form", cidr))
    })?;

    let addr = validate_ipv4_address(addr)?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| invalid(format!("bad prefix length in '{}'", cidr)))?;

    // Room for a gateway plus clients
    if !(8..=30).contains(&prefix) {
        return Err(invalid(format!("prefix length {} out of range (8-30)", prefix)));
    }

    Ok((Ipv4Addr::from(u32::from(addr) & u32::from(prefix_to_netmask(prefix))), prefix))
}

/// Netmask in dotted notation for a prefix length
pub fn prefix_to_netmask(prefix: u8) -> Ipv4Addr {
    match prefix {
        0 => Ipv4Addr::UNSPECIFIED,
        p => Ipv4Addr::from(u32::MAX << (32 - u32::from(p.min(32)))),
    }
}

pub fn ipv4_in_network(addr: Ipv4Addr, network: Ipv4Addr, prefix: u8) -> bool {
    let mask = u32::from(prefix_to_netmask(prefix));
    (u32::from(addr) ^ u32::from(network)) & mask == 0
}

/// Guard a value written into a generated config file
///
/// A newline would let the value add directives of its own.
pub fn sanitize_config_value(value: &str) -> FantasmaResult<String> {
    if value.len() > CONFIG_VALUE_MAX {
        return Err(invalid(format!(
            "config value is {} bytes (max {})",
            value.len(),
            CONFIG_VALUE_MAX
        )));
    }
    if value.chars().any(|c| c != '\t' && c.is_control()) {
        return Err(invalid("config value contains control characters"));
    }
    Ok(value.to_owned())
}

/// SSIDs are 1-32 bytes without control characters
pub fn validate_ssid(ssid: &str) -> FantasmaResult<()> {
    if ssid.is_empty() || ssid.len() > SSID_MAX {
        return Err(invalid(format!(
            "SSID must be 1-{} bytes, got {}",
            SSID_MAX,
            ssid.len()
        )));
    }
    if ssid.chars().any(char::is_control) {
        return Err(invalid("SSID contains control characters"));
    }
    Ok(())
}

/// WPA2-PSK passphrase: 8-63 printable ASCII characters
pub fn validate_wifi_password(password: &str) -> FantasmaResult<()> {
    if !PASSPHRASE_LEN.contains(&password.len()) {
        return Err(invalid(format!(
            "WPA2 passphrase must be 8-63 characters, got {}",
            password.len()
        )));
    }
    if !password.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err(invalid("WPA2 passphrase must be printable ASCII"));
    }
    Ok(())
}

/// Validate a 2.4GHz channel (hostapd runs the AP with `hw_mode=g`)
pub fn validate_wifi_channel(channel: u8) -> FantasmaResult<()> {
    if !(1..=13).contains(&channel) {
        return Err(invalid(format!(
            "Invalid channel {} for band 2.4GHz (1-13)",
            channel
        )));
    }
    Ok(())
}

/// ISO 3166-1 alpha-2 shape
pub fn validate_country_code(code: &str) -> FantasmaResult<()> {
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid(format!("country code '{}' is not two letters", code)));
    }
    Ok(())
}
