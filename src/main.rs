//! powerwatchd - Session power and idle management daemon.
//!
//! Watches session idle time and drives the dim -> blank -> suspend cascade,
//! battery warnings, lid handling, and the D-Bus control surface.

mod backlight;
mod battery;
mod cascade;
mod config;
mod daemon;
mod events;
mod idle;
mod inhibit;
mod notify;
mod profiles;
mod service;
mod session;
mod state;

use crate::backlight::{Backlight, DisplayPower, SysfsBacklight, X11DisplayPower};
use crate::battery::UPowerMonitor;
use crate::cascade::Hardware;
use crate::config::Config;
use crate::daemon::Daemon;
use crate::idle::X11IdleSource;
use crate::notify::Notifier;
use crate::profiles::PowerProfiles;
use crate::service::{OBJECT_PATH, PowerService};
use crate::session::{SessionManager, SleepWatcher};

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Power management daemon for X11 sessions.
///
/// Dims, blanks and suspends on idle, tracks the battery, and exposes the
/// whole thing over D-Bus.
#[derive(Parser, Debug)]
#[command(name = "powerwatchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable dry-run mode (log suspend/shutdown/lock instead of doing them).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("powerwatchd v{} starting", env!("CARGO_PKG_VERSION"));

    let config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    if args.dry_run {
        info!("Dry-run mode: session-manager actions will only be logged");
    }

    // The idle sampler is mandatory; everything else degrades gracefully.
    let idle = X11IdleSource::connect()
        .context("Cannot watch session idle time. Is this an X11 session with DISPLAY set?")?;

    let screen = SysfsBacklight::discover_screen();
    match &screen {
        Some(s) => info!("Screen backlight: {}", s.name()),
        None => warn!("No screen backlight found; dimming disabled"),
    }
    let keyboard = SysfsBacklight::discover_keyboard();
    if let Some(k) = &keyboard {
        info!("Keyboard backlight: {}", k.name());
    }

    let display = match X11DisplayPower::connect() {
        Ok(d) => Some(d),
        Err(e) => {
            warn!("DPMS unavailable, blanking disabled: {}", e);
            None
        }
    };

    let hardware = Hardware::new(
        screen.map(|s| Box::new(s) as Box<dyn Backlight + Send>),
        keyboard.map(|k| Box::new(k) as Box<dyn Backlight + Send>),
        display.map(|d| Box::new(d) as Box<dyn DisplayPower + Send>),
    );

    let (tx, rx) = mpsc::channel(64);

    let system = zbus::Connection::system()
        .await
        .context("Failed to connect to the system bus")?;

    let session_conn = zbus::connection::Builder::session()
        .context("Failed to configure session bus connection")?
        .name(service::BUS_NAME)
        .context("Failed to claim bus name; is another instance running?")?
        .serve_at(OBJECT_PATH, PowerService::new(tx.clone()))
        .context("Failed to register service object")?
        .build()
        .await
        .context("Failed to connect to the session bus")?;

    let session = SessionManager::new(system.clone(), config.lock_command.clone(), args.dry_run);
    let notifier = Notifier::new(session_conn.clone());
    let profiles = PowerProfiles::new(system.clone());

    UPowerMonitor::new(system.clone()).spawn(
        tx.clone(),
        Duration::from_secs(config.battery_poll_interval_seconds.max(1)),
    );
    SleepWatcher::spawn(system, tx.clone());

    let mut daemon = Daemon::new(
        config,
        args.config,
        hardware,
        Box::new(idle),
        session,
        Some(notifier),
        Some(profiles),
        rx,
        tx,
    );

    let iface = session_conn
        .object_server()
        .interface::<_, PowerService>(OBJECT_PATH)
        .await
        .context("Service object missing after registration")?;
    daemon.set_signal_interface(iface);

    info!("Serving {} at {}", service::BUS_NAME, OBJECT_PATH);
    daemon.run().await;

    info!("powerwatchd stopped");
    Ok(())
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("powerwatchd={}", level))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}
