//! Hot-plug detection.
//!
//! With the `usb` feature and a libusb that supports it, attach and detach
//! notifications come from [`watch_usb_hotplug`](crate::infrastructure::hid::watch_usb_hotplug).
//! Everywhere else, including the simulated transport, [`watch_hotplug`]
//! re-enumerates on a fixed period and compares the sorted set of Busylight
//! paths with the previous pass.  Either way a change only asks the service
//! to re-run discovery; the directory works out what was added or removed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::service::ServiceHandle;
use crate::application::transport::HidTransport;

/// Default poll period.
pub const HOTPLUG_POLL: Duration = Duration::from_secs(2);

/// Whichever hot-plug source is running.
pub enum HotplugWatcher {
    Polling(JoinHandle<()>),
    #[cfg(feature = "usb")]
    Native(crate::infrastructure::hid::UsbHotplugWatch),
}

impl HotplugWatcher {
    pub fn stop(self) {
        match self {
            HotplugWatcher::Polling(task) => task.abort(),
            #[cfg(feature = "usb")]
            HotplugWatcher::Native(watch) => drop(watch),
        }
    }
}

/// Spawns the watcher.  It stops on its own once the service has stopped.
pub fn watch_hotplug(
    transport: Arc<dyn HidTransport>,
    handle: ServiceHandle,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Vec<String>> = None;

        loop {
            ticker.tick().await;
            let paths = match attached_paths(transport.as_ref()) {
                Ok(paths) => paths,
                Err(e) => {
                    debug!("hot-plug poll skipped: {e}");
                    continue;
                }
            };

            // The service runs its own discovery at startup, so the first
            // pass only records a baseline.
            let changed = last.as_ref().is_some_and(|prev| *prev != paths);
            last = Some(paths);
            if changed {
                info!("device set changed; rediscovering");
                if handle.rediscover().is_err() {
                    warn!("busylight service stopped; hot-plug watcher exiting");
                    break;
                }
            }
        }
    })
}

fn attached_paths(
    transport: &dyn HidTransport,
) -> Result<Vec<String>, crate::application::transport::TransportError> {
    let mut paths: Vec<String> = transport
        .enumerate()?
        .into_iter()
        .filter(|d| d.is_busylight())
        .map(|d| d.path)
        .collect();
    paths.sort();
    Ok(paths)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
