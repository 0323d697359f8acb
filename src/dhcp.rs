//! DHCP/DNS service for hotspot clients via dnsmasq

use crate::error::FantasmaResult;
use crate::interface::SharingConfig;
use crate::validation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CONFIG_FILE_NAME: &str = "dnsmasq.conf";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpConfig {
    pub interface: String,
    pub range_start: String,
    pub range_end: String,
    pub gateway: String,
    pub dns_servers: Vec<String>,
    /// dnsmasq lease time, e.g. `12h`
    pub lease_time: String,
}

impl DhcpConfig {
    /// DHCP service on the target interface of a hotspot session
    pub fn for_session(
        config: &SharingConfig,
        dns_servers: &[String],
        lease_time: &str,
    ) -> FantasmaResult<Self> {
        let (gateway, _) = config.gateway()?;
        Ok(Self {
            interface: config.target_interface.name.clone(),
            range_start: config.dhcp_start.clone(),
            range_end: config.dhcp_end.clone(),
            gateway: gateway.to_string(),
            dns_servers: dns_servers.to_vec(),
            lease_time: lease_time.to_string(),
        })
    }
}

pub fn generate_config(config: &DhcpConfig) -> FantasmaResult<String> {
    // Validate all user-provided configuration values
    validation::validate_interface_name(&config.interface)?;
    validation::validate_ipv4_address(&config.range_start)?;
    validation::validate_ipv4_address(&config.range_end)?;
    validation::validate_ipv4_address(&config.gateway)?;
    for dns in &config.dns_servers {
        validation::validate_ip_address(dns)?;
    }
    let lease_time = validation::sanitize_config_value(&config.lease_time)?;

    let mut conf = String::new();
    conf.push_str(&format!("interface={}\n", config.interface));
    conf.push_str("bind-interfaces\n");
    conf.push_str(&format!(
        "dhcp-range={},{},{}\n",
        config.range_start, config.range_end, lease_time
    ));
    conf.push_str(&format!("dhcp-option=3,{}\n", config.gateway));

    if !config.dns_servers.is_empty() {
        conf.push_str(&format!("dhcp-option=6,{}\n", config.dns_servers.join(",")));
    }

    Ok(conf)
}

/// Write the configuration into `dir` and return its path
pub async fn write_config(dir: &Path, config: &DhcpConfig) -> FantasmaResult<PathBuf> {
    let content = generate_config(config)?;
    let path = dir.join(CONFIG_FILE_NAME);
    fs::create_dir_all(dir).await?;
    fs::write(&path, content).await?;
    Ok(path)
}
