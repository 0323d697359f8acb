//! fantasma - network sharing library
//!
//! Shares the connection of a source interface through a target interface,
//! either as a routed hotspot (own subnet, DHCP, NAT, optional WiFi access
//! point) or as a Layer-2 bridge. The actual work is delegated to the tools
//! of the host OS through one [`PlatformAdapter`] per platform:
//! - Linux: ip, hostapd, dnsmasq, iptables
//! - macOS: ifconfig, pfctl, Internet Sharing
//! - Windows: netsh hosted network
//! - Android/Termux: su, iptables, termux-api
//!
//! [`FantasmaCore`] runs one sharing session at a time on top of an adapter
//! picked from the [`ExtensionRegistry`].

pub mod error;
pub mod validation;
pub mod interface;
pub mod config;
pub mod tool;
pub mod hostapd;
pub mod dhcp;
pub mod firewall;
pub mod adapter;
pub mod registry;
pub mod platform;
pub mod session;
pub mod orchestrator;
pub mod profile;
pub mod doctor;

// Re-export commonly used types
pub use error::{FantasmaError, FantasmaResult};
pub use interface::{ConnectionType, NetworkInterface, NetworkMode, SharingConfig};
pub use config::Settings;
pub use adapter::{AdapterFactory, PlatformAdapter, StatusMap};
pub use registry::{hook, ExtensionRegistry, HookContext, HookEvent};
pub use orchestrator::{FantasmaCore, SessionStatus};
pub use session::{SessionRecord, SessionStore};
pub use profile::{Profile, ProfileStore};
pub use doctor::{CheckStatus, DiagnosticReport, Doctor};
