use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use button_controller::logging::init_logging_with_filter;
use button_controller::{ConnectionManager, ControllerConfig, LoggingMode, Settings};
use zone_transport::{MemoryTransport, PlaybackState, TransportLink, ZoneSnapshot};

/// iPort surface mount button controller
///
/// Keeps every configured button panel connected, maps key presses onto
/// playback actions and mirrors playback state onto the panel LEDs.
#[derive(Parser, Debug)]
#[command(name = "iport-buttons")]
#[command(about = "Connects iPort button panels to a playback transport")]
#[command(version)]
pub struct Args {
    /// Settings file (JSON)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// TCP port panels listen on
    #[arg(short, long, default_value = "10001")]
    pub port: u16,

    /// Reconciliation interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub scan_interval_ms: u64,

    /// Keep-alive interval in seconds
    #[arg(long, default_value = "10")]
    pub keepalive_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Pair an in-memory transport holding one zone with this name
    #[arg(long)]
    pub simulate_zone: Option<String>,

    /// Validate the settings file and exit
    #[arg(long)]
    pub check: bool,
}

impl Args {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow::anyhow!("Port must not be 0"));
        }

        if self.scan_interval_ms == 0 {
            return Err(anyhow::anyhow!("Scan interval must be positive"));
        }

        if self.keepalive_secs == 0 {
            return Err(anyhow::anyhow!("Keep-alive interval must be positive"));
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                    self.log_level
                ));
            }
        }

        Ok(())
    }
}

/// Configuration derived from command line arguments and environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: PathBuf,
    pub controller: ControllerConfig,
    pub log_level: String,
    pub log_json: bool,
    pub simulate_zone: Option<String>,
    pub check: bool,
}

impl Config {
    /// Create configuration from command line arguments and environment variables
    pub fn from_env() -> Result<Self> {
        let mut args = Args::parse();

        if let Ok(path) = std::env::var("IPORT_SETTINGS") {
            args.settings = Some(PathBuf::from(path));
        }

        if let Ok(port) = std::env::var("IPORT_PORT") {
            args.port = port
                .parse()
                .context("Invalid IPORT_PORT environment variable")?;
        }

        if let Ok(log_level) = std::env::var("IPORT_LOG_LEVEL") {
            args.log_level = log_level;
        }

        args.validate()?;
        Config::try_from(args)
    }

    pub fn print_summary(&self) {
        info!("Configuration:");
        info!("  Settings file: {}", self.settings_path.display());
        info!("  Panel port: {}", self.controller.device_port);
        info!("  Scan interval: {}ms", self.controller.scan_interval.as_millis());
        info!("  Keep-alive: {}s", self.controller.keepalive_interval.as_secs());
        if let Some(zone) = &self.simulate_zone {
            info!("  Simulated zone: {}", zone);
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        let settings_path = match args.settings {
            Some(path) => path,
            None => default_settings_path()?,
        };

        let controller = ControllerConfig::new()
            .with_device_port(args.port)
            .with_scan_interval(Duration::from_millis(args.scan_interval_ms))
            .with_keepalive_interval(Duration::from_secs(args.keepalive_secs));
        controller.validate()?;

        Ok(Self {
            settings_path,
            controller,
            log_level: args.log_level.to_lowercase(),
            log_json: args.log_json,
            simulate_zone: args.simulate_zone,
            check: args.check,
        })
    }
}

fn default_settings_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine the user config directory")?;
    Ok(base.join("iport-buttons").join("settings.json"))
}

/// Load settings, writing a default file on first run
fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        warn!("No settings at {}, starting with none configured", path.display());
        let settings = Settings::default().with_defaults();
        if let Err(e) = settings.save(path) {
            warn!("Could not write default settings: {}", e);
        }
        return Ok(settings);
    }

    Settings::load(path).with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn transport_link(simulate_zone: Option<&str>) -> TransportLink {
    match simulate_zone {
        Some(zone) => {
            let transport =
                MemoryTransport::new().with_zone(ZoneSnapshot::new(zone, zone, PlaybackState::Stopped));
            TransportLink::paired(Arc::new(transport))
        }
        None => TransportLink::new(),
    }
}

#[cfg(unix)]
async fn reload_signal(hangup: &mut Option<tokio::signal::unix::Signal>) {
    if let Some(signal) = hangup {
        if signal.recv().await.is_some() {
            return;
        }
        *hangup = None;
    }
    std::future::pending().await
}

async fn run(config: Config) -> Result<()> {
    let settings = load_settings(&config.settings_path)?;
    let link = transport_link(config.simulate_zone.as_deref());
    let manager = ConnectionManager::start(config.controller.clone(), settings, link)
        .context("Failed to start button controller")?;

    #[cfg(unix)]
    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .map_err(|e| warn!("SIGHUP reload unavailable: {}", e))
        .ok();

    info!("Running, press Ctrl+C to stop");

    loop {
        #[cfg(unix)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl+C")?;
                    break;
                }
                _ = reload_signal(&mut hangup) => {
                    info!("Reloading settings from {}", config.settings_path.display());
                    match load_settings(&config.settings_path) {
                        Ok(settings) => {
                            if let Err(e) = manager.apply_settings(settings) {
                                warn!("Rejected reloaded settings: {}", e);
                            }
                        }
                        Err(e) => warn!("{:#}", e),
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            break;
        }
    }

    info!("Shutting down");
    manager.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    let mode = if config.log_json {
        LoggingMode::Json
    } else {
        LoggingMode::Development
    };
    init_logging_with_filter(mode, Some(&config.log_level)).context("Failed to initialize logging")?;

    if config.check {
        let settings = Settings::load(&config.settings_path)
            .with_context(|| format!("Invalid settings in {}", config.settings_path.display()))?;
        println!("{}", serde_json::to_string_pretty(&settings)?);
        println!(
            "Settings OK: {} panel(s) configured",
            settings.configured_devices().count()
        );
        return Ok(());
    }

    config.print_summary();
    run(config).await
}
