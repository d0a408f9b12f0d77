//! The single event loop that owns every device.
//!
//! # How it fits together (for beginners)
//!
//! Sessions, schedules, and the directory are plain structs with `&mut self`
//! methods.  Nothing in them is shared between threads.  Instead, one Tokio
//! task ([`BusylightService::run`]) owns all of them and reacts to
//! [`ServiceEvent`]s arriving on one unbounded channel:
//!
//! ```text
//! timer tasks ──────┐
//! HID reader hooks ─┤
//! hot-plug watcher ─┼──► ServiceEvent channel ──► BusylightService::run
//! ServiceHandle ────┘                               ├─ DeviceDirectory
//!                                                   └─ ProgramScheduler
//! ```
//!
//! Callers talk to the loop through a cloneable [`ServiceHandle`].  Queries
//! carry a `oneshot` sender for the answer; state requests are
//! fire-and-forget.

use std::ops::ControlFlow;
use std::sync::Arc;

use busylight_core::DeviceAlias;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::application::directory::{DeviceDirectory, DirectoryTiming};
use crate::application::scheduler::{ProgramScheduler, ScheduleStatus, StateRequest};
use crate::application::session::DeviceInfo;
use crate::application::timers::{LoopHandle, TimerFired, TimerKind};
use crate::application::transport::HidTransport;

// ── Events ────────────────────────────────────────────────────────────────────

/// Everything the event loop reacts to.
#[derive(Debug)]
pub enum ServiceEvent {
    Timer(TimerFired),
    /// Raw inbound report from a device's reader.
    Telemetry { device: String, bytes: Vec<u8> },
    /// The set of attached devices may have changed.
    Rediscover,
    Command(ServiceCommand),
}

/// Requests from a [`ServiceHandle`].
#[derive(Debug)]
pub enum ServiceCommand {
    ListDevices(oneshot::Sender<Vec<String>>),
    RequestState(StateRequest),
    Describe {
        device: String,
        reply: oneshot::Sender<Option<DeviceInfo>>,
    },
    Schedules(oneshot::Sender<Vec<ScheduleStatus>>),
    /// Turn everything off, close every channel, then stop the loop.
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("busylight service is not running")]
    Stopped,
}

// ── Service ───────────────────────────────────────────────────────────────────

pub struct BusylightService {
    directory: DeviceDirectory,
    scheduler: ProgramScheduler,
    events: UnboundedReceiver<ServiceEvent>,
}

impl BusylightService {
    /// Builds the service and the handle callers use to reach it.  Nothing
    /// touches the bus until [`run`](Self::run) is awaited.
    pub fn new(
        transport: Arc<dyn HidTransport>,
        aliases: Vec<DeviceAlias>,
        timing: DirectoryTiming,
    ) -> (Self, ServiceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = LoopHandle::new(tx.clone());
        let service = Self {
            directory: DeviceDirectory::new(transport, aliases, timing, timers.clone()),
            scheduler: ProgramScheduler::new(timers),
            events: rx,
        };
        (service, ServiceHandle { events: tx })
    }

    /// Runs discovery once, then processes events until shut down.
    pub async fn run(mut self) {
        let added = self.rediscover();
        info!("busylight service started with {added} device(s)");

        while let Some(event) = self.events.recv().await {
            if self.handle_event(event).is_break() {
                break;
            }
        }
        info!("busylight service stopped");
    }

    /// Processes one event.  Returns `Break` after a shutdown.
    pub fn handle_event(&mut self, event: ServiceEvent) -> ControlFlow<()> {
        match event {
            ServiceEvent::Timer(fired) => self.handle_timer(&fired),
            ServiceEvent::Telemetry { device, bytes } => {
                match self.directory.get_mut(&device) {
                    Some(session) => session.record_telemetry(bytes),
                    None => debug!("{device}: telemetry for unknown device dropped"),
                }
            }
            ServiceEvent::Rediscover => {
                self.rediscover();
            }
            ServiceEvent::Command(command) => return self.handle_command(command),
        }
        ControlFlow::Continue(())
    }

    /// Reconciles the directory.  Departing devices lose their program right
    /// away; the session itself lingers until its removal timer fires.
    fn rediscover(&mut self) -> usize {
        let outcome = self.directory.reconcile();
        for id in &outcome.departing {
            self.scheduler.cancel(id);
        }
        outcome.added.len()
    }

    fn handle_timer(&mut self, fired: &TimerFired) {
        match fired.kind {
            TimerKind::Keepalive | TimerKind::ToneMute => {
                if let Some(session) = self.directory.get_mut(&fired.device) {
                    session.handle_timer(fired);
                }
            }
            TimerKind::Repeat | TimerKind::AutoOff => {
                self.scheduler.handle_timer(&mut self.directory, fired);
            }
            TimerKind::Removal => {
                // Also drops a schedule started during the grace period.
                if self.directory.finish_removal(fired) {
                    self.scheduler.cancel(&fired.device);
                }
            }
        }
    }

    fn handle_command(&mut self, command: ServiceCommand) -> ControlFlow<()> {
        match command {
            ServiceCommand::ListDevices(reply) => {
                let _ = reply.send(self.directory.ids());
            }
            ServiceCommand::RequestState(request) => {
                self.scheduler.request_state(&mut self.directory, &request);
            }
            ServiceCommand::Describe { device, reply } => {
                let _ = reply.send(self.directory.get(&device).map(|s| s.info()));
            }
            ServiceCommand::Schedules(reply) => {
                let _ = reply.send(self.scheduler.statuses());
            }
            ServiceCommand::Shutdown(reply) => {
                info!("shutting down all busylight devices");
                self.scheduler.cancel_all();
                self.directory.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

impl std::fmt::Debug for BusylightService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusylightService")
            .field("directory", &self.directory)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cheap, cloneable access to a running [`BusylightService`].
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    events: UnboundedSender<ServiceEvent>,
}

impl ServiceHandle {
    fn command(&self, command: ServiceCommand) -> Result<(), ServiceError> {
        self.events
            .send(ServiceEvent::Command(command))
            .map_err(|_| ServiceError::Stopped)
    }

    /// Logical ids of all managed devices, sorted.
    pub async fn list_device_ids(&self) -> Result<Vec<String>, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.command(ServiceCommand::ListDevices(tx))?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Queues a state change.  Validation happens inside the loop; an invalid
    /// request is logged there and otherwise ignored.
    pub fn request_state(&self, request: StateRequest) -> Result<(), ServiceError> {
        self.command(ServiceCommand::RequestState(request))
    }

    /// Snapshot of one device's session, `None` for an unknown id.
    pub async fn describe(&self, device: &str) -> Result<Option<DeviceInfo>, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.command(ServiceCommand::Describe {
            device: device.to_string(),
            reply: tx,
        })?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    pub async fn schedules(&self) -> Result<Vec<ScheduleStatus>, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.command(ServiceCommand::Schedules(tx))?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Asks the loop to re-run device discovery.
    pub fn rediscover(&self) -> Result<(), ServiceError> {
        self.events
            .send(ServiceEvent::Rediscover)
            .map_err(|_| ServiceError::Stopped)
    }

    /// Turns every device off and stops the loop.  Resolves once the devices
    /// have been reset.
    pub async fn shutdown_all(&self) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.command(ServiceCommand::Shutdown(tx))?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::hid::SimulatedHidTransport;
    use busylight_core::protocol::frame::OFF_PAYLOAD;
    use std::time::Duration;

    fn start(transport: &SimulatedHidTransport, aliases: &[&str]) -> ServiceHandle {
        let aliases = aliases.iter().map(|a| a.parse().unwrap()).collect();
        let (service, handle) =
            BusylightService::new(Arc::new(transport.clone()), aliases, DirectoryTiming::default());
        tokio::spawn(service.run());
        handle
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_device_ids_after_startup() {
        // Arrange
        let transport = SimulatedHidTransport::with_devices(2);
        let handle = start(&transport, &["b:SIM00001", "a:SIM00002"]);

        // Act
        let ids = handle.list_device_ids().await.unwrap();

        // Assert
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_unknown_device_is_none() {
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &[]);

        assert_eq!(handle.describe("nope").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_reports_session_snapshot() {
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &["desk:SIM00001"]);

        let info = handle.describe("desk").await.unwrap().unwrap();

        assert_eq!(info.id, "desk");
        assert_eq!(info.serial_number, "SIM00001");
        assert!(info.connected);
        assert_eq!(info.intensity, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_state_creates_schedule() {
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &["desk:SIM00001"]);

        handle
            .request_state(StateRequest::new("desk", "warning").with_pattern("blink"))
            .unwrap();
        let schedules = handle.schedules().await.unwrap();

        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].device, "desk");
        assert!(!schedules[0].auto_off);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_telemetry_reaches_session() {
        // Arrange
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &["desk:SIM00001"]);
        handle.list_device_ids().await.unwrap();
        let mut report = [0u8; 64];
        report[0] = b'1';

        // Act
        assert!(transport.inject_report("sim-1", &report));
        let info = handle.describe("desk").await.unwrap().unwrap();

        // Assert
        assert_eq!(info.telemetry.activity, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_all_turns_devices_off_and_stops() {
        // Arrange
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &["desk:SIM00001"]);
        handle
            .request_state(StateRequest::new("desk", "error"))
            .unwrap();

        // Act
        handle.shutdown_all().await.unwrap();

        // Assert
        assert_eq!(transport.last_payload("sim-1"), Some(OFF_PAYLOAD));
        assert!(!transport.is_open("sim-1"));
        tokio::task::yield_now().await;
        assert_eq!(handle.list_device_ids().await, Err(ServiceError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_requested_during_grace_ends_with_session() {
        // Arrange
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &["desk:SIM00001"]);
        handle.list_device_ids().await.unwrap();
        transport.detach("sim-1");
        handle.rediscover().unwrap();

        // Act
        handle
            .request_state(
                StateRequest::new("desk", "ok")
                    .with_pattern("blink")
                    .with_audio("quiet")
                    .with_duration_ms(60_000),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        // Assert
        assert!(handle.list_device_ids().await.unwrap().is_empty());
        assert!(handle.schedules().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replugged_device_gets_no_program_from_before_removal() {
        // Arrange: a schedule is started while the device is departing.
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &["desk:SIM00001"]);
        handle.list_device_ids().await.unwrap();
        transport.detach("sim-1");
        handle.rediscover().unwrap();
        handle
            .request_state(
                StateRequest::new("desk", "ok")
                    .with_pattern("blink")
                    .with_audio("quiet"),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        // Act
        transport.attach(SimulatedHidTransport::descriptor("sim-1", "SIM00001"));
        handle.rediscover().unwrap();
        assert_eq!(handle.list_device_ids().await.unwrap(), vec!["desk".to_string()]);
        transport.clear_frames("sim-1");
        tokio::time::sleep(Duration::from_secs(100)).await;

        // Assert: only keepalives reach the fresh session.
        let frames = transport.frames("sim-1");
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f[1] == 0x8F), "unexpected program frame");
        assert!(handle.schedules().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rediscover_picks_up_new_device() {
        let transport = SimulatedHidTransport::with_devices(1);
        let handle = start(&transport, &[]);
        assert_eq!(handle.list_device_ids().await.unwrap().len(), 1);

        transport.attach(SimulatedHidTransport::descriptor("sim-2", "SIM00002"));
        handle.rediscover().unwrap();

        assert_eq!(handle.list_device_ids().await.unwrap().len(), 2);
    }
}
