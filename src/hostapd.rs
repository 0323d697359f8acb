//! hostapd configuration for the WiFi access point
//!
//! Only generation lives here; the daemon itself is launched by the platform
//! adapter through its [`ShellTool`](crate::tool::ShellTool).

use crate::error::{FantasmaError, FantasmaResult};
use crate::interface::SharingConfig;
use crate::validation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CONFIG_FILE_NAME: &str = "hostapd.conf";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPointConfig {
    /// Interface name
    pub interface: String,
    pub ssid: String,
    /// WPA2 passphrase, None for an open network
    pub password: Option<String>,
    /// 2.4GHz channel number
    pub channel: u8,
    /// Country code (regulatory domain)
    pub country_code: String,
    pub hidden: bool,
    /// Enable WMM/QoS
    pub wmm_enabled: bool,
}

impl AccessPointConfig {
    /// Access point for the target interface of a hotspot session
    pub fn for_session(config: &SharingConfig, country_code: &str) -> FantasmaResult<Self> {
        let ssid = config
            .ssid
            .clone()
            .ok_or_else(|| FantasmaError::Validation("WiFi hotspot requires an SSID".to_string()))?;

        Ok(Self {
            interface: config.target_interface.name.clone(),
            ssid,
            password: config.password.clone(),
            channel: config.channel,
            country_code: country_code.to_ascii_uppercase(),
            hidden: false,
            wmm_enabled: true,
        })
    }
}

/// Generate hostapd configuration text
pub fn generate_config(config: &AccessPointConfig) -> FantasmaResult<String> {
    validation::validate_interface_name(&config.interface)?;
    validation::validate_ssid(&config.ssid)?;
    validation::validate_wifi_channel(config.channel)?;
    validation::validate_country_code(&config.country_code)?;

    let mut conf = String::new();

    conf.push_str(&format!("interface={}\n", config.interface));
    conf.push_str("driver=nl80211\n");
    conf.push_str(&format!("ssid={}\n", config.ssid));
    conf.push_str(&format!("country_code={}\n", config.country_code));
    conf.push_str("hw_mode=g\n");
    conf.push_str(&format!("channel={}\n", config.channel));

    if config.wmm_enabled {
        conf.push_str("wmm_enabled=1\n");
    }

    conf.push_str("macaddr_acl=0\nauth_algs=1\n");
    conf.push_str(if config.hidden {
        "ignore_broadcast_ssid=1\n"
    } else {
        "ignore_broadcast_ssid=0\n"
    });

    if let Some(ref password) = config.password {
        validation::validate_wifi_password(password)?;
        conf.push_str("wpa=2\nwpa_passphrase=");
        conf.push_str(password);
        conf.push_str("\nwpa_key_mgmt=WPA-PSK\nwpa_pairwise=CCMP\nrsn_pairwise=CCMP\n");
    }

    Ok(conf)
}

/// Write the configuration into `dir` and return its path
pub async fn write_config(dir: &Path, config: &AccessPointConfig) -> FantasmaResult<PathBuf> {
    let content = generate_config(config)?;
    let path = dir.join(CONFIG_FILE_NAME);
    fs::create_dir_all(dir).await?;
    fs::write(&path, content).await?;
    Ok(path)
}
