//! Busylight daemon entry point.
//!
//! Discovers attached Busylight status lights, keeps each one alive, and
//! exposes a WebSocket JSON control surface for putting devices into named
//! states (ok, warning, error, ...).
//!
//! # Usage
//!
//! ```text
//! busylightd [OPTIONS]
//!
//! Options:
//!   -l, --log-level <LEVEL>       error | warn | info | debug | trace
//!   -a, --bind-addr <IP>          control server address [default: 0.0.0.0]
//!   -p, --port <PORT>             control server port [default: 8765]
//!   -d, --device <NAME:SERIAL>    give the device with SERIAL the id NAME
//!   -c, --config <PATH>           TOML config file
//!       --simulate <N>            drive N simulated devices instead of USB
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Description                 |
//! |------------------------|-----------------------------|
//! | `BUSYLIGHT_LOG_LEVEL`  | Same as `--log-level`       |
//! | `BUSYLIGHT_BIND_ADDR`  | Same as `--bind-addr`       |
//! | `BUSYLIGHT_PORT`       | Same as `--port`            |
//! | `RUST_LOG`             | Full `tracing` filter; wins over everything |
//!
//! CLI values win over the config file.  `--device` mappings are added in
//! front of the file's `[devices] aliases`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use busylight_daemon::application::service::{BusylightService, ServiceHandle};
use busylight_daemon::application::transport::HidTransport;
use busylight_daemon::infrastructure::control::{bind_listener, serve};
use busylight_daemon::infrastructure::hid::SimulatedHidTransport;
#[cfg(feature = "usb")]
use busylight_daemon::infrastructure::hid::{watch_usb_hotplug, UsbHidTransport};
use busylight_daemon::infrastructure::hotplug::{watch_hotplug, HotplugWatcher};
use busylight_daemon::infrastructure::storage::config::{
    load_config, load_config_from, normalize_log_level, ConfigError, DaemonConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Busylight status-light daemon.
#[derive(Debug, Parser)]
#[command(
    name = "busylightd",
    about = "Drives Busylight USB status lights and serves a WebSocket control API",
    version
)]
struct Cli {
    /// Log level: error, warn, info, debug, trace.
    #[arg(short = 'l', long, env = "BUSYLIGHT_LOG_LEVEL")]
    log_level: Option<String>,

    /// IP address for the control server.  Defaults to the config file's
    /// value, then `0.0.0.0`.
    #[arg(short = 'a', long, env = "BUSYLIGHT_BIND_ADDR")]
    bind_addr: Option<String>,

    /// TCP port for the control server.  Defaults to the config file's value,
    /// then 8765.
    #[arg(short = 'p', long, env = "BUSYLIGHT_PORT")]
    port: Option<u16>,

    /// `name:serial` alias mapping.  Repeatable.
    #[arg(short = 'd', long = "device", value_name = "NAME:SERIAL")]
    devices: Vec<String>,

    /// TOML config file.  Without it the platform default location is tried.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Run against this many simulated devices instead of USB hardware.
    #[arg(long, value_name = "N")]
    simulate: Option<usize>,
}

impl Cli {
    /// Reads the config file this invocation points at.
    fn load_file_config(&self) -> Result<DaemonConfig, ConfigError> {
        match &self.config {
            Some(path) => load_config_from(path),
            None => match load_config() {
                Err(ConfigError::NoPlatformConfigDir) => Ok(DaemonConfig::default()),
                other => other,
            },
        }
    }

    /// Layers the CLI values over `file`.
    fn into_daemon_config(self, file: DaemonConfig) -> DaemonConfig {
        let mut config = file;
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(addr) = self.bind_addr {
            config.control.bind_address = addr;
        }
        if let Some(port) = self.port {
            config.control.port = port;
        }
        let mut aliases = self.devices;
        aliases.append(&mut config.devices.aliases);
        config.devices.aliases = aliases;
        config
    }
}

fn control_addr(config: &DaemonConfig) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", config.control.bind_address, config.control.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid control address: '{}:{}'",
                config.control.bind_address, config.control.port
            )
        })
}

fn select_transport(simulate: Option<usize>) -> Arc<dyn HidTransport> {
    #[cfg(feature = "usb")]
    if simulate.is_none() {
        return Arc::new(UsbHidTransport::new());
    }

    let count = simulate.unwrap_or(1);
    info!("using {count} simulated device(s)");
    Arc::new(SimulatedHidTransport::with_devices(count))
}

/// Prefers libusb notifications for real hardware and polls otherwise.
fn start_hotplug(
    simulate: Option<usize>,
    transport: Arc<dyn HidTransport>,
    handle: ServiceHandle,
    poll: std::time::Duration,
) -> HotplugWatcher {
    #[cfg(feature = "usb")]
    if simulate.is_none() {
        if let Some(watch) = watch_usb_hotplug(handle.clone()) {
            info!("using libusb hot-plug notifications");
            return HotplugWatcher::Native(watch);
        }
    }
    #[cfg(not(feature = "usb"))]
    let _ = simulate;

    info!("polling for hot-plug changes every {poll:?}");
    HotplugWatcher::Polling(watch_hotplug(transport, handle, poll))
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("failed to listen for SIGTERM: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C signal: {e}");
        std::future::pending::<()>().await;
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let simulate = cli.simulate;
    let file_config = cli.load_file_config();

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level, otherwise `info`.
    let requested_level = cli
        .log_level
        .clone()
        .or_else(|| file_config.as_ref().ok().map(|c| c.log_level.clone()));
    let level = requested_level
        .as_deref()
        .map(normalize_log_level)
        .transpose();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(level.as_ref().ok().and_then(|l| *l).unwrap_or("info"))
        }))
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let file_config = file_config.inspect_err(|e| error!("{e}"))?;
    level.inspect_err(|e| error!("{e}"))?;
    let config = cli.into_daemon_config(file_config);
    let aliases = config.parse_aliases().inspect_err(|e| error!("{e}"))?;
    let addr = control_addr(&config).inspect_err(|e| error!("{e:#}"))?;

    info!(
        "busylight daemon starting: control={addr}, aliases={}",
        aliases.len()
    );

    // ── Service wiring ────────────────────────────────────────────────────────
    let transport = select_transport(simulate);
    let (service, handle) = BusylightService::new(
        Arc::clone(&transport),
        aliases,
        config.timing.directory_timing(),
    );
    let service_task = tokio::spawn(service.run());
    let watcher = start_hotplug(
        simulate,
        transport,
        handle.clone(),
        config.timing.hotplug_poll(),
    );

    let listener = bind_listener(addr).await.inspect_err(|e| error!("{e:#}"))?;
    let running = Arc::new(AtomicBool::new(true));
    let server = tokio::spawn(serve(listener, handle.clone(), Arc::clone(&running)));

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    running.store(false, Ordering::Relaxed);
    if let Err(e) = handle.shutdown_all().await {
        warn!("{e}");
    }
    watcher.stop();
    let _ = server.await;
    let _ = service_task.await;

    info!("busylight daemon stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
