//! Configuration management for fantasma

use crate::error::{FantasmaError, FantasmaResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fantasma/fantasma.toml";

/// Main fantasma configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Configuration file paths
    #[serde(default)]
    pub paths: ConfigPaths,
    /// Network settings used by the backends
    #[serde(default)]
    pub network: NetworkSettings,
    /// Privilege handling
    #[serde(default)]
    pub privileges: PrivilegeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPaths {
    /// Transient daemon config files (hostapd.conf, dnsmasq.conf)
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
    /// Saved sharing profiles
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,
    /// Record of the running session
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_linux_bridge")]
    pub linux_bridge: String,
    #[serde(default = "default_macos_bridge")]
    pub macos_bridge: String,
    #[serde(default = "default_android_bridge")]
    pub android_bridge: String,
    /// DNS servers handed to hotspot clients
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<String>,
    /// DHCP lease time (dnsmasq syntax)
    #[serde(default = "default_lease_time")]
    pub lease_time: String,
    /// Default WiFi channel
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// Regulatory domain for the access point
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeSettings {
    /// Wrap privileged commands in sudo when not root
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,
}

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var_os(var).map(PathBuf::from)
}

fn default_runtime_dir() -> PathBuf {
    runtime_dir_for(crate::tool::is_root(), env_dir("XDG_RUNTIME_DIR"))
}

fn default_profiles_dir() -> PathBuf {
    profiles_dir_for(
        crate::tool::is_root(),
        env_dir("XDG_CONFIG_HOME"),
        env_dir("HOME"),
    )
}

fn default_state_file() -> PathBuf {
    default_runtime_dir().join("session.json")
}

/// `/run/fantasma` for root; an unprivileged user cannot create it, so they
/// get their own runtime directory (or one under the temp dir)
fn runtime_dir_for(root: bool, user_runtime: Option<PathBuf>) -> PathBuf {
    if root {
        return PathBuf::from("/run/fantasma");
    }
    match user_runtime {
        Some(dir) if dir.is_absolute() => dir.join("fantasma"),
        _ => std::env::temp_dir().join("fantasma"),
    }
}

fn profiles_dir_for(root: bool, config_home: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if root {
        return PathBuf::from("/etc/fantasma/profiles");
    }
    match (config_home, home) {
        (Some(dir), _) if dir.is_absolute() => dir.join("fantasma/profiles"),
        (_, Some(home)) if home.is_absolute() => home.join(".config/fantasma/profiles"),
        _ => std::env::temp_dir().join("fantasma/profiles"),
    }
}

fn default_linux_bridge() -> String {
    "br-fantasma".to_string()
}

fn default_macos_bridge() -> String {
    "bridge0".to_string()
}

fn default_android_bridge() -> String {
    "br0".to_string()
}

fn default_dns_servers() -> Vec<String> {
    vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()]
}

fn default_lease_time() -> String {
    "12h".to_string()
}

fn default_channel() -> u8 {
    crate::interface::DEFAULT_CHANNEL
}

fn default_country_code() -> String {
    "US".to_string()
}

fn default_use_sudo() -> bool {
    true
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            runtime_dir: default_runtime_dir(),
            profiles_dir: default_profiles_dir(),
            state_file: default_state_file(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            linux_bridge: default_linux_bridge(),
            macos_bridge: default_macos_bridge(),
            android_bridge: default_android_bridge(),
            dns_servers: default_dns_servers(),
            lease_time: default_lease_time(),
            channel: default_channel(),
            country_code: default_country_code(),
        }
    }
}

impl Default for PrivilegeSettings {
    fn default() -> Self {
        Self {
            use_sudo: default_use_sudo(),
        }
    }
}

impl Settings {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> FantasmaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| FantasmaError::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| FantasmaError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> FantasmaResult<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> FantasmaResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FantasmaError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| FantasmaError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Validate values that end up in generated daemon configs
    pub fn validate(&self) -> FantasmaResult<()> {
        use crate::validation;

        for bridge in [
            &self.network.linux_bridge,
            &self.network.macos_bridge,
            &self.network.android_bridge,
        ] {
            validation::validate_interface_name(bridge)?;
        }
        for dns in &self.network.dns_servers {
            validation::validate_ip_address(dns)?;
        }
        validation::validate_wifi_channel(self.network.channel)?;
        validation::validate_country_code(&self.network.country_code)?;
        validation::sanitize_config_value(&self.network.lease_time)?;
        Ok(())
    }

    /// Ensure runtime and profile directories exist
    pub fn ensure_directories(&self) -> FantasmaResult<()> {
        for dir in [&self.paths.runtime_dir, &self.paths.profiles_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| FantasmaError::Config(format!("Failed to create directory {:?}: {}", dir, e)))?;
        }
        Ok(())
    }
}
