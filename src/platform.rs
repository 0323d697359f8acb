//! Platform selection
//!
//! Picks the adapter for the running host from the registry.

use crate::adapter::{macos, termux, windows, PlatformAdapter};
use crate::config::Settings;
use crate::error::{FantasmaError, FantasmaResult};
use crate::interface::{classify_linux_interface, ConnectionType};
use crate::registry::ExtensionRegistry;
use tracing::{debug, info};

const BUILTIN_KEYS: [&str; 4] = ["linux", "macos", "windows", "termux"];

/// Whether `/proc/version` content identifies an Android kernel
pub fn is_android_kernel(proc_version: &str) -> bool {
    proc_version.to_ascii_lowercase().contains("android")
}

/// Registry key for an OS name as reported by `std::env::consts::OS`
///
/// `proc_version` is only consulted on Linux, where an Android kernel maps to
/// `termux`.
pub fn platform_key(os: &str, proc_version: Option<&str>) -> Option<&'static str> {
    match os {
        "macos" => Some("macos"),
        "windows" => Some("windows"),
        "android" => Some("termux"),
        "linux" if proc_version.is_some_and(is_android_kernel) => Some("termux"),
        "linux" => Some("linux"),
        _ => None,
    }
}

/// Key for the host this process runs on
pub fn detect_platform_key() -> Option<&'static str> {
    let os = std::env::consts::OS;
    let proc_version = if os == "linux" {
        std::fs::read_to_string("/proc/version").ok()
    } else {
        None
    };
    platform_key(os, proc_version.as_deref())
}

/// Guess an interface type from its name, using the naming scheme of the
/// platform `key`; unknown keys use Linux names
pub fn classify_interface_name(key: Option<&str>, name: &str) -> ConnectionType {
    match key {
        Some("macos") => macos::classify_macos_interface(name),
        Some("windows") => windows::classify_windows_interface(name),
        Some("termux") => termux::classify_android_interface(name),
        _ => classify_linux_interface(name),
    }
}

/// Pick an adapter
///
/// An explicit `preferred` key must be registered. Otherwise the built-in key
/// for the host is used; when that key is missing from the registry, the
/// first custom adapter (in key order) that reports `is_supported()` wins.
pub async fn select_adapter(
    registry: &ExtensionRegistry,
    settings: &Settings,
    preferred: Option<&str>,
) -> FantasmaResult<Box<dyn PlatformAdapter>> {
    select_for_host(registry, settings, preferred, detect_platform_key()).await
}

/// [`select_adapter`] with the host key supplied by the caller
pub async fn select_for_host(
    registry: &ExtensionRegistry,
    settings: &Settings,
    preferred: Option<&str>,
    host_key: Option<&str>,
) -> FantasmaResult<Box<dyn PlatformAdapter>> {
    if let Some(key) = preferred {
        let factory = registry.get_adapter(key).ok_or_else(|| {
            FantasmaError::UnsupportedPlatform(format!(
                "no adapter registered as '{}' (available: {})",
                key,
                registry.adapter_keys().join(", ")
            ))
        })?;
        info!("Using requested adapter: {}", key);
        return Ok(factory(settings));
    }

    if let Some(key) = host_key {
        if let Some(factory) = registry.get_adapter(key) {
            let adapter = factory(settings);
            info!("Detected platform: {}", adapter.name());
            return Ok(adapter);
        }
        debug!("No built-in adapter '{}' registered", key);
    }

    for key in registry.adapter_keys() {
        if BUILTIN_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(factory) = registry.get_adapter(&key) {
            let adapter = factory(settings);
            if adapter.is_supported().await {
                info!("Using custom adapter: {}", key);
                return Ok(adapter);
            }
        }
    }

    Err(FantasmaError::UnsupportedPlatform(
        host_key.unwrap_or(std::env::consts::OS).to_string(),
    ))
}
