//! Platform adapters
//!
//! One adapter per operating system turns a [`SharingConfig`] into the
//! concrete tool invocations of that platform.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      FantasmaCore (orchestrator)    │
//! └──────────────┬──────────────────────┘
//!                │ Box<dyn PlatformAdapter>
//!    ┌───────────┼───────────┬──────────┐
//!    ▼           ▼           ▼          ▼
//! ┌──────┐   ┌──────┐   ┌───────┐   ┌──────┐
//! │Linux │   │macOS │   │Windows│   │Termux│  <- Platform adapters
//! └──────┘   └──────┘   └───────┘   └──────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use libfantasma::adapter::{linux, PlatformAdapter};
//! use libfantasma::config::Settings;
//!
//! # async fn demo() {
//! let adapter = linux::create_adapter(&Settings::default());
//! for iface in adapter.detect_interfaces().await {
//!     println!("{}", iface);
//! }
//! # }
//! ```

pub mod linux;
pub mod macos;
pub mod termux;
pub mod windows;

use crate::config::Settings;
use crate::error::FantasmaResult;
use crate::interface::{NetworkInterface, SharingConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Live facts reported by an adapter, keyed by fact name
pub type StatusMap = HashMap<String, Value>;

/// Common interface that every platform backend implements
///
/// `start_*` return `Ok(false)` when a step failed and the partial setup was
/// rolled back; `Err` is reserved for failures outside the OS work itself.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Display name of the platform ("Linux", "macOS", ...)
    fn name(&self) -> &str;

    /// Enumerate usable interfaces; empty on failure
    async fn detect_interfaces(&self) -> Vec<NetworkInterface>;

    /// NAT/router mode: address the target, serve DHCP, start an AP when the
    /// target is WiFi, enable forwarding and masquerading
    async fn start_hotspot(&self, config: &SharingConfig) -> FantasmaResult<bool>;

    /// Layer-2 mode: join source and target into one bridge
    async fn start_bridge(&self, config: &SharingConfig) -> FantasmaResult<bool>;

    /// Undo everything either start may have done; safe to repeat
    async fn stop_sharing(&self) -> FantasmaResult<bool>;

    /// Re-derive live state from the OS
    async fn get_status(&self) -> StatusMap;

    /// Whether this adapter can run on the current host
    async fn is_supported(&self) -> bool;
}

/// Factory function type for creating adapters
pub type AdapterFactory = fn(&Settings) -> Box<dyn PlatformAdapter>;

/// Build a status map from `(key, value)` pairs
pub(crate) fn status_map<I>(entries: I) -> StatusMap
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
