//! System diagnostics
//!
//! Checks that the tools a platform backend shells out to are present, that
//! the process has the privileges it needs, and flags host configuration
//! known to get in the way. Every probe is bounded by a five second timeout.

use crate::error::FantasmaResult;
use crate::interface::{ConnectionType, NetworkInterface};
use crate::tool::{self, ShellTool};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const VERSION_FLAGS: [&str; 4] = ["--version", "-v", "-V", "version"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Info,
}

impl CheckStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Pass => "✓",
            Self::Warn => "⚠",
            Self::Fail => "✗",
            Self::Info => "ℹ",
        }
    }

    /// ANSI color for terminal output
    pub fn color(&self) -> &'static str {
        match self {
            Self::Pass => "\x1b[0;32m",
            Self::Warn => "\x1b[1;33m",
            Self::Fail => "\x1b[0;31m",
            Self::Info => "\x1b[0;34m",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
            Self::Info => "INFO",
        })
    }
}

/// Result of a single diagnostic check
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub details: Option<String>,
    pub fix_suggestion: Option<String>,
}

impl DiagnosticCheck {
    pub fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            details: None,
            fix_suggestion: None,
        }
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn fix(mut self, suggestion: impl Into<String>) -> Self {
        self.fix_suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub platform_info: BTreeMap<String, String>,
    pub interfaces: Vec<NetworkInterface>,
    pub dependencies: Vec<DiagnosticCheck>,
    pub capabilities: Vec<DiagnosticCheck>,
    pub known_issues: Vec<DiagnosticCheck>,
    pub overall_status: CheckStatus,
}

impl DiagnosticReport {
    pub fn passed(&self) -> bool {
        self.overall_status != CheckStatus::Fail
    }

    pub fn to_json(&self) -> FantasmaResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs the checks for one platform (`linux`, `macos`, `windows`, `termux`)
pub struct Doctor {
    tool: ShellTool,
    platform_key: String,
}

impl Doctor {
    pub fn new(tool: ShellTool, platform_key: &str) -> Self {
        Self {
            tool,
            platform_key: platform_key.to_string(),
        }
    }

    async fn probe(&self, program: &str, args: &[&str]) -> Option<tool::CommandOutput> {
        match self.tool.output_with_timeout(program, args, PROBE_TIMEOUT).await {
            Ok(output) => Some(output),
            Err(e) => {
                debug!("probe failed: {}", e);
                None
            }
        }
    }

    /// `None` when the command is missing, else its version line or
    /// "installed"
    async fn command_version(&self, name: &str) -> Option<String> {
        let locator = if self.platform_key == "windows" { "where" } else { "which" };
        if !self.probe(locator, &[name]).await.is_some_and(|o| o.success()) {
            return None;
        }

        for flag in VERSION_FLAGS {
            if let Some(output) = self.probe(name, &[flag]).await {
                let line = output.stdout.lines().next().unwrap_or_default().trim();
                if output.success() && !line.is_empty() && line.len() < 100 {
                    return Some(line.to_string());
                }
            }
        }
        Some("installed".to_string())
    }

    async fn dependency(
        &self,
        name: &str,
        command: &str,
        missing: CheckStatus,
        fix: Option<&str>,
    ) -> DiagnosticCheck {
        match self.command_version(command).await {
            Some(version) => DiagnosticCheck::new(name, CheckStatus::Pass, format!("Installed: {}", version)),
            None => {
                let check = DiagnosticCheck::new(name, missing, "Not installed");
                match fix {
                    Some(fix) => check.fix(fix),
                    None => check,
                }
            }
        }
    }

    pub async fn platform_info(&self) -> BTreeMap<String, String> {
        let mut info = BTreeMap::new();
        info.insert("system".to_string(), std::env::consts::OS.to_string());
        info.insert("machine".to_string(), std::env::consts::ARCH.to_string());
        info.insert("platform".to_string(), self.platform_key.clone());

        if self.platform_key != "windows" {
            if let Some(output) = self.probe("uname", &["-r"]).await {
                if output.success() {
                    info.insert("release".to_string(), output.stdout.trim().to_string());
                }
            }
        }

        if let Some(os_release) = self.tool.read_file("/etc/os-release").await {
            if let Some(name) = os_release
                .lines()
                .find_map(|l| l.strip_prefix("PRETTY_NAME="))
            {
                info.insert("distribution".to_string(), name.trim().trim_matches('"').to_string());
            }
        }

        if self.platform_key == "termux" {
            info.insert("environment".to_string(), "Termux".to_string());
        }

        info
    }

    pub fn check_privileges() -> DiagnosticCheck {
        if tool::is_root() {
            DiagnosticCheck::new("Privileges", CheckStatus::Pass, "Running with administrative privileges")
        } else {
            DiagnosticCheck::new("Privileges", CheckStatus::Warn, "Not running with administrative privileges")
                .details("Some operations may require elevated privileges")
                .fix("Run with sudo (Linux/macOS) or as Administrator (Windows)")
        }
    }

    async fn linux_dependencies(&self) -> Vec<DiagnosticCheck> {
        let mut checks = vec![
            self.dependency(
                "hostapd",
                "hostapd",
                CheckStatus::Fail,
                Some("Install: sudo apt install hostapd (Debian/Ubuntu) or sudo dnf install hostapd (Fedora)"),
            )
            .await,
            self.dependency(
                "dnsmasq",
                "dnsmasq",
                CheckStatus::Fail,
                Some("Install: sudo apt install dnsmasq (Debian/Ubuntu) or sudo dnf install dnsmasq (Fedora)"),
            )
            .await,
            self.dependency("iptables", "iptables", CheckStatus::Warn, Some("Install: sudo apt install iptables"))
                .await,
        ];

        match self.command_version("nft").await {
            Some(version) => checks.push(DiagnosticCheck::new(
                "nftables",
                CheckStatus::Pass,
                format!("Installed: {} (optional)", version),
            )),
            None => checks.push(DiagnosticCheck::new(
                "nftables",
                CheckStatus::Info,
                "Not installed (optional alternative to iptables)",
            )),
        }

        let iw = self.dependency("iw", "iw", CheckStatus::Warn, Some("Install: sudo apt install iw")).await;
        checks.push(if iw.status == CheckStatus::Warn {
            DiagnosticCheck {
                message: "Not installed (needed for WiFi diagnostics)".to_string(),
                ..iw
            }
        } else {
            iw
        });

        checks
    }

    async fn macos_dependencies(&self) -> Vec<DiagnosticCheck> {
        let mut checks = vec![DiagnosticCheck::new(
            "Internet Sharing",
            CheckStatus::Pass,
            "macOS built-in feature available",
        )];
        if self.command_version("networksetup").await.is_some() {
            checks.push(DiagnosticCheck::new("networksetup", CheckStatus::Pass, "Available (built-in)"));
        }
        checks
    }

    async fn windows_dependencies(&self) -> Vec<DiagnosticCheck> {
        let mut checks = Vec::new();
        if self.command_version("netsh").await.is_some() {
            checks.push(DiagnosticCheck::new("netsh", CheckStatus::Pass, "Available (built-in)"));
        }

        let supported = self
            .probe("netsh", &["wlan", "show", "drivers"])
            .await
            .is_some_and(|o| {
                o.stdout.lines().any(|l| {
                    l.trim_start().starts_with("Hosted network supported") && l.trim_end().ends_with("Yes")
                })
            });
        checks.push(if supported {
            DiagnosticCheck::new("Hosted Network", CheckStatus::Pass, "Supported by WiFi driver")
        } else {
            DiagnosticCheck::new("Hosted Network", CheckStatus::Fail, "Not supported by WiFi driver")
                .details("Your WiFi adapter may not support Windows Hosted Network")
        });
        checks
    }

    async fn termux_dependencies(&self) -> Vec<DiagnosticCheck> {
        let mut checks = vec![
            self.dependency("iptables", "iptables", CheckStatus::Fail, Some("Install: pkg install iptables"))
                .await,
        ];

        let rooted = self
            .probe("su", &["-c", "id"])
            .await
            .is_some_and(|o| o.stdout.contains("uid=0"));
        checks.push(if rooted {
            DiagnosticCheck::new("Root Access", CheckStatus::Pass, "Available (device is rooted)")
        } else {
            DiagnosticCheck::new("Root Access", CheckStatus::Warn, "Not available")
                .details("Some features require root access on Android")
        });
        checks
    }

    async fn known_issues(&self) -> Vec<DiagnosticCheck> {
        let mut issues = Vec::new();

        match self.platform_key.as_str() {
            "linux" => {
                let nm_active = self
                    .probe("systemctl", &["is-active", "NetworkManager"])
                    .await
                    .is_some_and(|o| o.stdout.trim() == "active");
                if nm_active {
                    issues.push(
                        DiagnosticCheck::new(
                            "NetworkManager Active",
                            CheckStatus::Warn,
                            "NetworkManager may interfere with manual network configuration",
                        )
                        .fix("Mark the target unmanaged: nmcli device set <iface> managed no"),
                    );
                }

                if self.tool.read_file("/etc/selinux/config").await.is_some() {
                    let enforcing = self
                        .probe("getenforce", &[])
                        .await
                        .is_some_and(|o| o.stdout.contains("Enforcing"));
                    if enforcing {
                        issues.push(
                            DiagnosticCheck::new("SELinux", CheckStatus::Warn, "SELinux is enforcing")
                                .details("May require policy adjustments for network operations")
                                .fix("Temporarily set permissive: sudo setenforce 0"),
                        );
                    }
                }
            }
            "macos" => {
                let sip = self
                    .probe("csrutil", &["status"])
                    .await
                    .is_some_and(|o| o.stdout.contains("enabled"));
                if sip {
                    issues.push(
                        DiagnosticCheck::new(
                            "System Integrity Protection",
                            CheckStatus::Info,
                            "SIP is enabled (normal)",
                        )
                        .details("Some low-level operations may be restricted"),
                    );
                }
            }
            _ => {}
        }

        issues
    }

    fn capabilities(&self, interfaces: &[NetworkInterface]) -> Vec<DiagnosticCheck> {
        let has_wifi = interfaces.iter().any(|i| i.kind == ConnectionType::Wifi);
        let full_support = matches!(self.platform_key.as_str(), "linux" | "macos" | "windows");

        let hotspot = if !has_wifi {
            DiagnosticCheck::new("Hotspot Mode", CheckStatus::Info, "No WiFi interface detected")
        } else if full_support {
            DiagnosticCheck::new("Hotspot Mode", CheckStatus::Pass, "Supported")
        } else {
            DiagnosticCheck::new("Hotspot Mode", CheckStatus::Warn, "Partially supported")
        };

        vec![
            hotspot,
            DiagnosticCheck::new("Bridge Mode", CheckStatus::Pass, "Supported on all interfaces"),
        ]
    }

    /// Full report; `interfaces` comes from the platform adapter
    pub async fn run(&self, interfaces: Vec<NetworkInterface>) -> DiagnosticReport {
        let platform_info = self.platform_info().await;

        let mut dependencies = vec![Self::check_privileges()];
        dependencies.extend(match self.platform_key.as_str() {
            "linux" => self.linux_dependencies().await,
            "macos" => self.macos_dependencies().await,
            "windows" => self.windows_dependencies().await,
            "termux" => self.termux_dependencies().await,
            _ => Vec::new(),
        });

        let capabilities = self.capabilities(&interfaces);
        let known_issues = self.known_issues().await;

        let overall_status = if dependencies.iter().any(|c| c.status == CheckStatus::Fail) {
            CheckStatus::Fail
        } else {
            CheckStatus::Pass
        };

        DiagnosticReport {
            platform_info,
            interfaces,
            dependencies,
            capabilities,
            known_issues,
            overall_status,
        }
    }
}
