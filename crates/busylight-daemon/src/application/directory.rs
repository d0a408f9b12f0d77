//! Device directory: keeps one session per attached Busylight.
//!
//! Each pass of [`DeviceDirectory::reconcile`] enumerates the bus, keeps
//! only supported vendor/product pairs, and computes each device's logical
//! id (operator alias first, folded serial hash otherwise).
//!
//! - A new id gets a session that is connected and forced off, so every
//!   device starts from a known state.
//! - An id that disappears is not dropped at once.  A removal timer runs for
//!   a short grace period (hot-plug enumeration tends to flicker); if the
//!   device is back before it fires, nothing happens.  Otherwise the session
//!   is closed without writing and dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use busylight_core::{logical_device_id, DeviceAlias};
use tracing::{debug, info, warn};

use crate::application::session::{DeviceSession, KEEPALIVE_PERIOD};
use crate::application::timers::{LoopHandle, TimerFired, TimerHandle, TimerKind};
use crate::application::transport::HidTransport;

/// Default wait between a device vanishing and its session being dropped.
pub const REMOVAL_GRACE: Duration = Duration::from_millis(1000);

/// Timing knobs shared by the directory and the sessions it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryTiming {
    pub keepalive: Duration,
    pub removal_grace: Duration,
}

impl Default for DirectoryTiming {
    fn default() -> Self {
        Self {
            keepalive: KEEPALIVE_PERIOD,
            removal_grace: REMOVAL_GRACE,
        }
    }
}

/// What changed during one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ids that got a new session.
    pub added: Vec<String>,
    /// Ids that vanished and are now in their grace period.
    pub departing: Vec<String>,
    /// Ids that came back during their grace period.
    pub returned: Vec<String>,
}

pub struct DeviceDirectory {
    transport: Arc<dyn HidTransport>,
    aliases: Vec<DeviceAlias>,
    sessions: BTreeMap<String, DeviceSession>,
    removals: HashMap<String, TimerHandle>,
    timing: DirectoryTiming,
    timers: LoopHandle,
}

impl DeviceDirectory {
    pub fn new(
        transport: Arc<dyn HidTransport>,
        aliases: Vec<DeviceAlias>,
        timing: DirectoryTiming,
        timers: LoopHandle,
    ) -> Self {
        Self {
            transport,
            aliases,
            sessions: BTreeMap::new(),
            removals: HashMap::new(),
            timing,
            timers,
        }
    }

    /// Logical ids of every managed device, in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&DeviceSession> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DeviceSession> {
        self.sessions.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// `true` while `id` is waiting out its removal grace period.
    pub fn is_departing(&self, id: &str) -> bool {
        self.removals.contains_key(id)
    }

    /// Synchronises sessions with the devices currently attached.
    ///
    /// An enumeration failure skips the pass entirely rather than treating
    /// every device as gone.
    pub fn reconcile(&mut self) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let devices = match self.transport.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("device discovery failed: {e}");
                return outcome;
            }
        };

        let mut present = HashSet::new();
        for device in devices.into_iter().filter(|d| d.is_busylight()) {
            let id = logical_device_id(&device.serial_number, &self.aliases);
            if !present.insert(id.clone()) {
                warn!("{id}: duplicate device at {} ignored", device.path);
                continue;
            }

            if let Some(session) = self.sessions.get_mut(&id) {
                if self.removals.remove(&id).is_some() {
                    info!("{id}: device returned before removal");
                    outcome.returned.push(id.clone());
                }
                if !session.is_bound_to(&device) {
                    session.rebind(device);
                }
                continue;
            }

            info!(
                "adding busylight device: id: {id}, serial: {}, model: {} {}",
                device.serial_number, device.manufacturer, device.product
            );
            let mut session = DeviceSession::new(
                id.clone(),
                Some(device),
                Arc::clone(&self.transport),
                self.timers.clone(),
            )
            .with_keepalive_period(self.timing.keepalive);
            session.connect();
            session.off();
            self.sessions.insert(id.clone(), session);
            outcome.added.push(id);
        }

        let vanished: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| !present.contains(*id) && !self.removals.contains_key(*id))
            .cloned()
            .collect();
        for id in vanished {
            info!("removing busylight device: id: {id}");
            let timer = self
                .timers
                .once(&id, TimerKind::Removal, self.timing.removal_grace);
            self.removals.insert(id.clone(), timer);
            outcome.departing.push(id);
        }

        outcome
    }

    /// Completes a removal when its grace timer fires.  Returns `true` if a
    /// session was dropped.
    pub fn finish_removal(&mut self, fired: &TimerFired) -> bool {
        let current = self.removals.get(&fired.device).is_some_and(|t| t.matches(fired));
        if !current {
            debug!("{}: ignoring stale removal timer", fired.device);
            return false;
        }
        self.removals.remove(&fired.device);
        match self.sessions.remove(&fired.device) {
            Some(mut session) => {
                session.disconnect(true);
                info!("{}: session dropped", fired.device);
                true
            }
            None => false,
        }
    }

    /// Turns every device off, closes every channel, and forgets them all.
    pub fn shutdown(&mut self) {
        self.removals.clear();
        for (id, session) in self.sessions.iter_mut() {
            info!("reset busylight device: {id}");
            session.off();
            session.disconnect(false);
        }
        self.sessions.clear();
    }
}

impl std::fmt::Debug for DeviceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDirectory")
            .field("sessions", &self.sessions)
            .field("departing", &self.removals.keys().collect::<Vec<_>>())
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
