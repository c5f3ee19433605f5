pub mod config;
pub mod controller;
pub mod link;
pub mod mapping;
pub mod monitor;
pub mod supervisor;

use crate::config::{AppConfig, CliOverrides, APP_NAME};
use crate::controller::EvdevSource;
use crate::mapping::OutputMode;
use crate::monitor::{ConsoleObserver, GuiObserver};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Bridges a joystick or gamepad to a MAVLink autopilot
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, subcommand_negates_reqs = true)]
struct Cli {
    /// Serial device (e.g. /dev/ttyACM0) or MAVLink endpoint (tcp:host:port, udp:host:port)
    #[arg(long, required = true)]
    serial: Option<String>,

    /// HID event device (e.g. /dev/input/event0)
    #[arg(long, required = true)]
    hid: Option<PathBuf>,

    /// Serial baud rate, overrides the config file
    #[arg(long)]
    baud: Option<u32>,

    /// Message sent on every tick
    #[arg(long, value_enum)]
    mode: Option<OutputMode>,

    /// Tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Config file, defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info", global = true)]
    log_level: LevelFilter,

    /// Also write plain-text logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show live HID input without connecting to an autopilot
    Monitor {
        #[arg(long)]
        hid: PathBuf,

        /// Print to the terminal even when a display is available
        #[arg(long)]
        console: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup(&cli)?;
    log_banner();

    // Abandoned blocking link I/O must not keep the process alive after shutdown
    supervisor::run_to_completion(run(cli), supervisor::SHUTDOWN_GRACE)?
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let shutdown = CancellationToken::new();
    let _signals = supervisor::spawn_signal_handler(shutdown.clone());

    if let Some(Command::Monitor { hid, console }) = &cli.command {
        monitor(hid.clone(), *console, shutdown).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let (Some(serial), Some(hid)) = (cli.serial.as_deref(), cli.hid.as_deref()) else {
        return Err(eyre!("--serial and --hid are required"));
    };

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = match AppConfig::load(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    config.apply(&CliOverrides {
        baud: cli.baud,
        mode: cli.mode,
        tick_interval_ms: cli.tick_ms,
    });

    match supervisor::run_service(config, serial, hid, shutdown).await {
        Ok(stats) => {
            info!("Clean shutdown, {} messages sent", stats.sent);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Startup failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn setup(cli: &Cli) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging(cli.log_level, cli.log_file.as_ref())
}

fn setup_logging(level: LevelFilter, log_file: Option<&PathBuf>) -> Result<()> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| eyre!("Failed to open log file {}: {}", path.display(), e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(level)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn log_banner() {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    info!(
        "{} {} started by {} on {} ({})",
        APP_NAME,
        env!("CARGO_PKG_VERSION"),
        user,
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

async fn monitor(hid: PathBuf, console: bool, shutdown: CancellationToken) -> Result<()> {
    let source = EvdevSource::open(&hid)?;
    let title = format!("{} ({})", source.name(), hid.display());

    if console || !monitor::display_available() {
        let mut observer = ConsoleObserver::stdout();
        monitor::run_monitor(Box::new(source), &mut observer, shutdown).await;
        return Ok(());
    }

    let (sender, receiver) = mpsc::channel(256);
    let poll_shutdown = shutdown.clone();
    let poller = tokio::spawn(async move {
        let mut observer = GuiObserver::new(sender);
        monitor::run_monitor(Box::new(source), &mut observer, poll_shutdown).await
    });

    let window_shutdown = shutdown.clone();
    let result =
        tokio::task::block_in_place(|| monitor::gui::run(title, receiver, window_shutdown));
    shutdown.cancel();
    poller.await?;
    result.map_err(|e| eyre!("Monitor window failed: {}", e))
}
