//! fantasma - network sharing CLI
//!
//! Shares the internet connection of one interface through another one,
//! as a NAT hotspot or as a Layer-2 bridge.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use libfantasma::config::DEFAULT_CONFIG_PATH;
use libfantasma::doctor::{CheckStatus, DiagnosticCheck, DiagnosticReport, Doctor};
use libfantasma::tool::{Elevation, ShellTool};
use libfantasma::validation;
use libfantasma::*;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "fantasma", version)]
#[command(about = "Share a network connection as a NAT hotspot or a Layer-2 bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force a platform adapter (linux, macos, windows, termux or a custom key)
    #[arg(long, global = true)]
    adapter: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON output (list, status, doctor, profile show)
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List shareable network interfaces
    List,
    /// Start sharing
    Start {
        #[command(flatten)]
        sharing: SharingArgs,
        /// Start from a saved profile; other flags override its values
        #[arg(long)]
        profile: Option<String>,
    },
    /// Stop sharing
    Stop {
        /// Tear down even when no session is recorded
        #[arg(long)]
        force: bool,
    },
    /// Show the sharing status
    Status,
    /// Run system diagnostics
    Doctor,
    /// Manage saved profiles
    #[command(subcommand)]
    Profile(ProfileCommands),
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Save a profile
    Save {
        name: String,
        #[command(flatten)]
        sharing: SharingArgs,
    },
    /// List saved profiles
    List,
    /// Show a profile (password hidden)
    Show { name: String },
    /// Delete a profile
    Delete { name: String },
}

#[derive(Args, Clone, Default)]
struct SharingArgs {
    /// Interface with internet access
    #[arg(short, long)]
    source: Option<String>,

    /// Interface to share through
    #[arg(short, long)]
    target: Option<String>,

    /// Bridge mode instead of hotspot
    #[arg(long)]
    bridge: bool,

    /// Access point name (WiFi hotspot)
    #[arg(long)]
    ssid: Option<String>,

    /// WPA2 passphrase, 8-63 characters (WiFi hotspot)
    #[arg(long)]
    password: Option<String>,

    /// WiFi channel (1-13)
    #[arg(long)]
    channel: Option<u8>,

    /// Hotspot subnet, e.g. 192.168.137.0/24
    #[arg(long)]
    ip_range: Option<String>,
}

/// ANSI colors, or plain text when disabled
struct Palette {
    enabled: bool,
}

impl Palette {
    const GREEN: &'static str = "\x1b[0;32m";
    const RED: &'static str = "\x1b[0;31m";
    const YELLOW: &'static str = "\x1b[1;33m";
    const BOLD: &'static str = "\x1b[1m";
    const RESET: &'static str = "\x1b[0m";

    fn new(no_color: bool) -> Self {
        Self {
            enabled: !no_color && atty::is(atty::Stream::Stdout),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.enabled {
            format!("{}{}{}", color, text, Self::RESET)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.paint(Self::GREEN, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(Self::RED, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(Self::YELLOW, text)
    }

    fn bold(&self, text: &str) -> String {
        self.paint(Self::BOLD, text)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let palette = Palette::new(cli.no_color);

    let result = match cli.command {
        Commands::List => handle_list(&cli).await,
        Commands::Start { ref sharing, ref profile } => {
            handle_start(&cli, &palette, sharing, profile.as_deref()).await
        }
        Commands::Stop { force } => handle_stop(&cli, &palette, force).await,
        Commands::Status => handle_status(&cli, &palette).await,
        Commands::Doctor => handle_doctor(&cli, &palette).await,
        Commands::Profile(ref cmd) => handle_profile(cmd, &cli, &palette).await,
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{}", palette.red(&format!("Error: {:#}", e)));
            process::exit(1);
        }
    }
}

/// Logs go to stderr so `--json` output stays clean
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fantasma={},libfantasma={}", level, level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let settings = match cli.config {
        Some(ref path) => Settings::load(path)?,
        None => Settings::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    settings.validate()?;
    Ok(settings)
}

async fn build_core(cli: &Cli, settings: &Settings) -> anyhow::Result<FantasmaCore> {
    let registry = Arc::new(ExtensionRegistry::with_builtin_adapters());
    let adapter = platform::select_adapter(&registry, settings, cli.adapter.as_deref()).await?;
    let store = SessionStore::new(&settings.paths.state_file);
    Ok(FantasmaCore::new(adapter, registry).with_session_store(store).await?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Detected interface by name; unknown names are classified from the name
/// alone, following the naming scheme of `platform_key`
async fn resolve_interface(
    core: &FantasmaCore,
    platform_key: Option<&str>,
    name: &str,
) -> NetworkInterface {
    match core.find_interface(name).await {
        Ok(iface) => iface,
        Err(_) => {
            warn!("Interface {} not detected, guessing its type from the name", name);
            NetworkInterface::new(name, platform::classify_interface_name(platform_key, name))
        }
    }
}

/// Check flag values and fold them into a configuration
///
/// `base` is the profile being started or overwritten, if any.
async fn build_config(
    core: &FantasmaCore,
    cli: &Cli,
    settings: &Settings,
    args: &SharingArgs,
    base: Option<SharingConfig>,
) -> anyhow::Result<SharingConfig> {
    let platform_key = cli.adapter.as_deref().or_else(|| platform::detect_platform_key());

    if let Some(ref ssid) = args.ssid {
        validation::validate_ssid(ssid)?;
    }
    if let Some(ref password) = args.password {
        validation::validate_wifi_password(password)?;
    }
    if let Some(channel) = args.channel {
        validation::validate_wifi_channel(channel)?;
    }

    let mut config = match base {
        Some(mut config) => {
            if let Some(ref name) = args.source {
                config.source_interface = resolve_interface(core, platform_key, name).await;
            }
            if let Some(ref name) = args.target {
                config.target_interface = resolve_interface(core, platform_key, name).await;
            }
            if args.bridge {
                config.mode = NetworkMode::Bridge;
            }
            config
        }
        None => {
            let (Some(source), Some(target)) = (&args.source, &args.target) else {
                bail!("both --source and --target are required");
            };
            let mode = if args.bridge { NetworkMode::Bridge } else { NetworkMode::Hotspot };
            let mut config = SharingConfig::new(
                mode,
                resolve_interface(core, platform_key, source).await,
                resolve_interface(core, platform_key, target).await,
            );
            config.channel = settings.network.channel;
            config
        }
    };

    if config.source_interface.name == config.target_interface.name {
        bail!("source and target must be different interfaces");
    }
    if let Some(ref ssid) = args.ssid {
        config.ssid = Some(ssid.clone());
    }
    if let Some(ref password) = args.password {
        config.password = Some(password.clone());
    }
    if let Some(channel) = args.channel {
        config.channel = channel;
    }
    if let Some(ref range) = args.ip_range {
        config = config.with_ip_range(range)?;
    }
    Ok(config)
}

async fn handle_list(cli: &Cli) -> anyhow::Result<bool> {
    let settings = load_settings(cli)?;
    let core = build_core(cli, &settings).await?;
    let interfaces = core.detect_interfaces().await;

    if cli.json {
        print_json(&interfaces)?;
    } else if interfaces.is_empty() {
        println!("No network interfaces found");
    } else {
        println!("{:<16} {:<10} {:<8} MAC", "INTERFACE", "TYPE", "STATE");
        for iface in &interfaces {
            println!(
                "{:<16} {:<10} {:<8} {}",
                iface.name,
                iface.kind,
                if iface.is_active { "up" } else { "down" },
                iface.mac_address.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(true)
}

async fn handle_start(
    cli: &Cli,
    palette: &Palette,
    sharing: &SharingArgs,
    profile: Option<&str>,
) -> anyhow::Result<bool> {
    let settings = load_settings(cli)?;
    let core = build_core(cli, &settings).await?;

    let base = match profile {
        Some(name) => {
            let store = ProfileStore::new(&settings.paths.profiles_dir);
            Some(store.load(name).await?.config)
        }
        None => None,
    };
    let config = build_config(&core, cli, &settings, sharing, base).await?;

    settings
        .ensure_directories()
        .context("cannot create runtime directories")?;

    if !core.start(config.clone()).await? {
        eprintln!("{}", palette.red("✗ Failed to start network sharing (see log for details)"));
        return Ok(false);
    }

    println!(
        "{} {} mode: {} -> {}",
        palette.green("✓ Sharing started"),
        config.mode,
        config.source_interface.name,
        config.target_interface.name
    );
    if let Some(ref ssid) = config.ssid {
        if config.needs_access_point() {
            println!("  SSID: {} (channel {})", ssid, config.channel);
        }
    }
    println!("  Stop with: fantasma stop");
    Ok(true)
}

async fn handle_stop(cli: &Cli, palette: &Palette, force: bool) -> anyhow::Result<bool> {
    let settings = load_settings(cli)?;
    let core = build_core(cli, &settings).await?;

    if !force && !core.is_active().await {
        println!("No active sharing session (use --force to tear down anyway)");
        return Ok(true);
    }

    let stopped = if force { core.force_stop().await } else { core.stop().await };
    if stopped {
        println!("{}", palette.green("✓ Sharing stopped"));
    } else {
        eprintln!("{}", palette.red("✗ Failed to stop network sharing"));
    }
    Ok(stopped)
}

async fn handle_status(cli: &Cli, palette: &Palette) -> anyhow::Result<bool> {
    let settings = load_settings(cli)?;
    let core = build_core(cli, &settings).await?;
    let status = core.get_status().await;

    if cli.json {
        print_json(&status.redacted())?;
        return Ok(true);
    }

    println!("{}", palette.bold(&format!("FantasmaWiFi status ({})", status.platform_name)));
    match status.config {
        Some(ref config) => {
            println!("  State:   {}", palette.green("active"));
            println!("  Mode:    {}", config.mode);
            println!("  Source:  {} ({})", config.source_interface.name, config.source_interface.kind);
            println!("  Target:  {} ({})", config.target_interface.name, config.target_interface.kind);
            if let Some(ref ssid) = config.ssid {
                println!("  SSID:    {}", ssid);
            }
            if config.mode == NetworkMode::Hotspot {
                println!("  Subnet:  {}", config.ip_range);
            }
            if let Some(id) = status.session_id {
                println!("  Session: {}", id);
            }
            if let Some(uptime) = status.uptime_secs {
                println!("  Uptime:  {}s", uptime);
            }
        }
        None => println!("  State:   {}", palette.yellow("inactive")),
    }

    let mut facts: Vec<_> = status.platform.iter().collect();
    facts.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in facts {
        println!("  {:<22} {}", format!("{}:", key), value);
    }
    Ok(true)
}

fn print_checks(palette: &Palette, title: &str, checks: &[DiagnosticCheck]) {
    if checks.is_empty() {
        return;
    }
    println!("\n{}", palette.bold(title));
    for check in checks {
        let symbol = palette.paint(check.status.color(), check.status.symbol());
        println!("  {} {}: {}", symbol, check.name, check.message);
        if let Some(ref details) = check.details {
            println!("      {}", details);
        }
        if let Some(ref fix) = check.fix_suggestion {
            println!("      Fix: {}", fix);
        }
    }
}

fn print_report(palette: &Palette, report: &DiagnosticReport) {
    println!("{}", palette.bold("FantasmaWiFi system diagnostics"));
    for (key, value) in &report.platform_info {
        println!("  {:<14} {}", format!("{}:", key), value);
    }

    println!("\n{}", palette.bold("Network interfaces"));
    if report.interfaces.is_empty() {
        println!("  none detected");
    }
    for iface in &report.interfaces {
        println!("  {}", iface);
    }

    print_checks(palette, "Dependencies", &report.dependencies);
    print_checks(palette, "Capabilities", &report.capabilities);
    print_checks(palette, "Known issues", &report.known_issues);

    let overall = report.overall_status;
    println!(
        "\nOverall: {}",
        palette.paint(overall.color(), &format!("{} {}", overall.symbol(), overall))
    );
    if overall == CheckStatus::Fail {
        println!("Fix the failed checks above before sharing.");
    }
}

async fn handle_doctor(cli: &Cli, palette: &Palette) -> anyhow::Result<bool> {
    let settings = load_settings(cli)?;
    let platform_key = cli
        .adapter
        .clone()
        .or_else(|| platform::detect_platform_key().map(str::to_string))
        .unwrap_or_else(|| std::env::consts::OS.to_string());

    let interfaces = match build_core(cli, &settings).await {
        Ok(core) => core.detect_interfaces().await,
        Err(e) => {
            warn!("Interface detection unavailable: {:#}", e);
            Vec::new()
        }
    };

    let doctor = Doctor::new(ShellTool::system(Elevation::None), &platform_key);
    let report = doctor.run(interfaces).await;

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print_report(palette, &report);
    }
    Ok(report.passed())
}

async fn handle_profile(cmd: &ProfileCommands, cli: &Cli, palette: &Palette) -> anyhow::Result<bool> {
    let settings = load_settings(cli)?;
    let store = ProfileStore::new(&settings.paths.profiles_dir);

    match cmd {
        ProfileCommands::Save { name, sharing } => {
            profile::validate_profile_name(name)?;
            let core = build_core(cli, &settings).await?;
            let config = build_config(&core, cli, &settings, sharing, None).await?;
            if !config.validate() {
                bail!("WiFi hotspot requires --ssid and --password");
            }
            let path = store.save(&Profile::new(name.as_str(), config)).await?;
            println!("{} {} ({})", palette.green("✓ Saved profile"), name, path.display());
        }
        ProfileCommands::List => {
            let names = store.list().await?;
            if cli.json {
                print_json(&names)?;
            } else if names.is_empty() {
                println!("No saved profiles");
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        ProfileCommands::Show { name } => {
            let mut profile = store.load(name).await?;
            profile.config = profile.config.redacted();
            if cli.json {
                print_json(&profile)?;
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(&profile).context("cannot render profile")?
                );
            }
        }
        ProfileCommands::Delete { name } => {
            store.delete(name).await?;
            println!("{} {}", palette.green("✓ Deleted profile"), name);
        }
    }
    Ok(true)
}
