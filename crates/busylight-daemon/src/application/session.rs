//! Device session: one open channel to one physical Busylight.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --keepalive tick--> open() --ok--> Connected
//!      ^                                             |
//!      +-------------- any write/open failure -------+
//! ```
//!
//! There is no terminal error state.  `connect()` starts a keepalive ticker
//! and every tick either re-opens the channel (re-sending the program the
//! session currently holds, so the light survives a reconnect) or sends a
//! keepalive frame.  No failure ever leaves this module; it is logged and
//! the next tick tries again.
//!
//! The session remembers the last color it showed so that tone steps keep
//! the light as it was.

use std::sync::Arc;
use std::time::Duration;

use busylight_core::domain::model::ToneCatalog;
use busylight_core::{
    checksum_frame, decode_telemetry, encode_program, parse_color, BusylightModel, ColorError,
    DeviceDescriptor, ProgramStep, Rgb, StepBuffer, TelemetryReport,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::application::service::ServiceEvent;
use crate::application::timers::{LoopHandle, TimerFired, TimerHandle, TimerKind};
use crate::application::transport::{DataHook, HidChannel, HidTransport};

/// Interval between keepalive frames.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(5);

/// How [`DeviceSession::alert`] shows its color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStyle {
    Blink { on_ticks: u8, off_ticks: u8 },
    Pulse,
}

impl Default for AlertStyle {
    fn default() -> Self {
        AlertStyle::Blink {
            on_ticks: 4,
            off_ticks: 3,
        }
    }
}

/// Snapshot of a session for callers outside the event loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub model: String,
    pub serial_number: String,
    pub path: String,
    pub connected: bool,
    pub intensity: u8,
    pub tones: Vec<String>,
    pub durations_ms: Vec<u32>,
    /// Hex dump of the program currently held.
    pub program: String,
    pub telemetry: TelemetryReport,
}

pub struct DeviceSession {
    id: String,
    device: Option<DeviceDescriptor>,
    model: Option<BusylightModel>,
    transport: Arc<dyn HidTransport>,
    channel: Option<Box<dyn HidChannel>>,
    steps: StepBuffer,
    intensity: u8,
    last_color: Rgb,
    telemetry: Vec<u8>,
    keepalive: Option<TimerHandle>,
    tone_timer: Option<TimerHandle>,
    keepalive_period: Duration,
    timers: LoopHandle,
}

impl DeviceSession {
    /// Creates a disconnected session.  Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(
        id: impl Into<String>,
        device: Option<DeviceDescriptor>,
        transport: Arc<dyn HidTransport>,
        timers: LoopHandle,
    ) -> Self {
        let model = device.as_ref().and_then(DeviceDescriptor::model);
        Self {
            id: id.into(),
            device,
            model,
            transport,
            channel: None,
            steps: StepBuffer::OFF,
            intensity: 100,
            last_color: Rgb::BLACK,
            telemetry: Vec::new(),
            keepalive: None,
            tone_timer: None,
            keepalive_period: KEEPALIVE_PERIOD,
            timers,
        }
    }

    pub fn with_keepalive_period(mut self, period: Duration) -> Self {
        self.keepalive_period = period;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn is_keepalive_running(&self) -> bool {
        self.keepalive.is_some()
    }

    /// The 64-byte program the session currently holds.
    pub fn steps(&self) -> StepBuffer {
        self.steps
    }

    pub fn intensity(&self) -> u8 {
        self.intensity
    }

    // ── Connection management ─────────────────────────────────────────────────

    /// Starts the keepalive ticker (once) and runs the first tick right away.
    ///
    /// Returns `false` only when no device is bound.
    pub fn connect(&mut self) -> bool {
        if self.device.is_none() {
            return false;
        }
        if self.keepalive.is_none() {
            self.keepalive = Some(self.timers.every(
                &self.id,
                TimerKind::Keepalive,
                self.keepalive_period,
            ));
            self.keepalive_tick();
        }
        true
    }

    /// Opens the channel if it is closed, otherwise sends a keepalive frame.
    pub fn keepalive_tick(&mut self) {
        if self.device.is_none() {
            return;
        }
        if self.channel.is_none() {
            self.open_channel();
        } else {
            self.send(StepBuffer::KEEPALIVE);
        }
    }

    /// Stops the keepalive ticker and closes the channel.
    ///
    /// A clean disconnect turns the device off first.  The unclean path skips
    /// the write, for devices that are already gone.
    pub fn disconnect(&mut self, unclean: bool) {
        self.keepalive = None;
        self.tone_timer = None;
        if !unclean {
            self.steps = StepBuffer::OFF;
            self.send(self.steps);
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        debug!("{}: disconnected (unclean: {unclean})", self.id);
    }

    /// Points the session at a new descriptor for the same device, e.g. after
    /// it moved to another port.  A connected session reopens at once.
    pub fn rebind(&mut self, device: DeviceDescriptor) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        info!("{}: device moved to {}", self.id, device.path);
        self.model = device.model();
        self.device = Some(device);
        if self.keepalive.is_some() {
            self.open_channel();
        }
    }

    /// Routes a timer firing owned by this session.  Stale firings are
    /// ignored.
    pub fn handle_timer(&mut self, fired: &TimerFired) {
        match fired.kind {
            TimerKind::Keepalive if self.keepalive.as_ref().is_some_and(|t| t.matches(fired)) => {
                self.keepalive_tick();
            }
            TimerKind::ToneMute if self.tone_timer.as_ref().is_some_and(|t| t.matches(fired)) => {
                self.tone_timer = None;
                self.build_and_send(&[ProgramStep::mute(self.last_color)]);
            }
            _ => debug!("{}: ignoring stale {:?} timer", self.id, fired.kind),
        }
    }

    /// Stores an inbound report.  Empty reports are ignored.
    pub fn record_telemetry(&mut self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        self.telemetry = bytes;
    }

    /// The most recent report, decoded.  All fields are empty until one
    /// arrives.
    pub fn telemetry(&self) -> TelemetryReport {
        decode_telemetry(&self.telemetry)
    }

    // ── Programs ──────────────────────────────────────────────────────────────

    /// Cancels a pending tone mute, sends OFF, then sends `steps`.
    pub fn apply_program(&mut self, steps: &[ProgramStep]) {
        self.tone_timer = None;
        self.send(StepBuffer::OFF);
        self.build_and_send(steps);
    }

    /// Cancels a pending tone mute and turns the device off.
    pub fn off(&mut self) {
        self.tone_timer = None;
        self.steps = StepBuffer::OFF;
        self.send(self.steps);
    }

    /// Sets the brightness applied to later `light`/`blink`/`pulse` calls.
    /// Values outside 0..=100 are clamped.
    pub fn set_intensity(&mut self, percent: i32) {
        self.intensity = percent.clamp(0, 100) as u8;
    }

    /// Constant light.
    ///
    /// # Errors
    ///
    /// Returns [`ColorError`] for a malformed color; nothing is sent.
    pub fn light(&mut self, color: &str) -> Result<(), ColorError> {
        let color = self.remember_color(color)?;
        self.build_and_send(&[ProgramStep::solid(color)]);
        Ok(())
    }

    /// On for `on_ticks`, off for `off_ticks` (tenths of a second).
    ///
    /// # Errors
    ///
    /// Returns [`ColorError`] for a malformed color; nothing is sent.
    pub fn blink(&mut self, color: &str, on_ticks: u8, off_ticks: u8) -> Result<(), ColorError> {
        let color = self.remember_color(color)?;
        self.build_and_send(&[ProgramStep::blink(color, on_ticks, off_ticks)]);
        Ok(())
    }

    /// Looping brightness ramp.
    ///
    /// # Errors
    ///
    /// Returns [`ColorError`] for a malformed color; nothing is sent.
    pub fn pulse(&mut self, color: &str) -> Result<(), ColorError> {
        let color = self.remember_color(color)?;
        self.build_and_send(&ProgramStep::pulse_ramp(color));
        Ok(())
    }

    /// Plays a tone: a silent priming step, then the tone itself.
    pub fn tone(&mut self, tone: u8, volume: u8) {
        self.tone_timer = None;
        self.build_and_send(&[ProgramStep::mute(self.last_color)]);
        self.build_and_send(&[ProgramStep::tone(self.last_color, tone, volume)]);
    }

    /// Plays `tone` once and mutes it after its natural length.
    ///
    /// Returns the tone length in milliseconds, or `None` if the bound model
    /// has no such tone.
    pub fn once(&mut self, tone: u8, volume: u8) -> Option<u32> {
        let duration_ms = self.tone_catalog().duration_ms(usize::from(tone))?;
        self.tone(tone, volume);
        self.tone_timer = Some(self.timers.once(
            &self.id,
            TimerKind::ToneMute,
            Duration::from_millis(u64::from(duration_ms)),
        ));
        Some(duration_ms)
    }

    /// Plays a tone, then shows `color` blinking or pulsing.
    ///
    /// # Errors
    ///
    /// Returns [`ColorError`] for a malformed color; nothing is sent.
    pub fn alert(
        &mut self,
        tone: u8,
        volume: u8,
        color: &str,
        style: AlertStyle,
    ) -> Result<(), ColorError> {
        parse_color(color)?;
        self.tone(tone, volume);
        match style {
            AlertStyle::Blink {
                on_ticks,
                off_ticks,
            } => self.blink(color, on_ticks, off_ticks),
            AlertStyle::Pulse => self.pulse(color),
        }
    }

    // ── Catalog lookups ───────────────────────────────────────────────────────

    pub fn tone_catalog(&self) -> ToneCatalog {
        self.model.map(|m| m.tones).unwrap_or(ToneCatalog::EMPTY)
    }

    pub fn tones(&self) -> Vec<&'static str> {
        self.tone_catalog().names()
    }

    pub fn durations(&self) -> Vec<u32> {
        self.tone_catalog().durations()
    }

    /// Model display name, empty when unknown.
    pub fn model_name(&self) -> &'static str {
        self.model.map(|m| m.name).unwrap_or("")
    }

    /// `true` if this session drives the device at `device.path`.
    pub fn is_bound_to(&self, device: &DeviceDescriptor) -> bool {
        self.device.as_ref().is_some_and(|d| d.path == device.path)
    }

    /// Hex dump of the held program, eight bytes per line.
    pub fn state_dump(&self) -> String {
        self.steps.to_string()
    }

    pub fn info(&self) -> DeviceInfo {
        let (serial_number, path) = self
            .device
            .as_ref()
            .map(|d| (d.serial_number.clone(), d.path.clone()))
            .unwrap_or_default();
        DeviceInfo {
            id: self.id.clone(),
            model: self.model_name().to_string(),
            serial_number,
            path,
            connected: self.is_connected(),
            intensity: self.intensity,
            tones: self.tones().into_iter().map(String::from).collect(),
            durations_ms: self.durations(),
            program: self.state_dump(),
            telemetry: self.telemetry(),
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn remember_color(&mut self, color: &str) -> Result<Rgb, ColorError> {
        let color = parse_color(color)?.scaled(self.intensity);
        self.last_color = color;
        Ok(color)
    }

    fn build_and_send(&mut self, steps: &[ProgramStep]) {
        self.steps = encode_program(steps);
        self.send(self.steps);
    }

    fn open_channel(&mut self) {
        let Some(path) = self.device.as_ref().map(|d| d.path.clone()) else {
            return;
        };
        match self.transport.open(&path, self.telemetry_hook()) {
            Ok(channel) => {
                info!("{}: connected to {path}", self.id);
                self.channel = Some(channel);
                self.send(self.steps);
            }
            Err(e) => {
                debug!("{}: open failed, retrying next tick: {e}", self.id);
                self.channel = None;
            }
        }
    }

    fn telemetry_hook(&self) -> DataHook {
        let timers = self.timers.clone();
        let device = self.id.clone();
        Box::new(move |bytes| {
            timers.post(ServiceEvent::Telemetry {
                device: device.clone(),
                bytes,
            });
        })
    }

    /// Writes one frame.  A failed write drops the channel; the next
    /// keepalive tick reopens it.
    fn send(&mut self, payload: StepBuffer) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        let frame = checksum_frame(payload.as_bytes());
        if let Err(e) = channel.write(&frame) {
            warn!("{}: {e}; marking channel closed", self.id);
            channel.close();
            self.channel = None;
        }
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("connected", &self.is_connected())
            .field("intensity", &self.intensity)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
