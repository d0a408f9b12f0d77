//! Program scheduler: turns a logical status request into a program on a
//! device and keeps it alive.
//!
//! # Why re-send? (for beginners)
//!
//! The firmware runs a step `repeat` times and then stops.  There is no
//! "forever", so the scheduler re-sends the same program on an interval of
//! `(on + off) ticks × 100 ms × repeat`, just as the device is about to run
//! out.  Each device has at most one such schedule; a new request replaces
//! the old one in a single step on the event loop, so a stale refresh can
//! never fire in between.
//!
//! A request with `duration_ms > 0` also arms an auto-off timer that drops
//! the schedule and turns the device off.

use std::collections::HashMap;
use std::time::Duration;

use busylight_core::domain::model::ToneCatalog;
use busylight_core::domain::status::{device_volume, StatusProfile};
use busylight_core::{AudioChoice, DeviceState, Pattern, ProgramStep};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::application::directory::DeviceDirectory;
use crate::application::timers::{LoopHandle, TimerFired, TimerHandle, TimerKind};

/// Onboard repeat count written into every scheduled step.
pub const REPEAT_COUNT: u8 = 10;

/// Steady on-time without a tone (10 s).
pub const STEADY_TICKS: u8 = 100;

/// Blink on- and off-time without a tone (1 s each).
pub const BLINK_TICKS: u8 = 10;

/// Length of one firmware tick.
pub const TICK: Duration = Duration::from_millis(100);

/// A caller's request, exactly as received.  Fields are validated when the
/// request is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRequest {
    pub device: String,
    pub state: String,
    pub pattern: String,
    /// `0` means "until the next request".
    pub duration_ms: u64,
    pub audio: String,
}

impl StateRequest {
    /// A steady, indefinite, audible request.
    pub fn new(device: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            state: state.into(),
            pattern: "steady".to_string(),
            duration_ms: 0,
            audio: "audible".to_string(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_audio(mut self, audio: impl Into<String>) -> Self {
        self.audio = audio.into();
        self
    }
}

/// The step to program and how often to refresh it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramPlan {
    pub step: ProgramStep,
    pub refresh_every: Duration,
}

/// Builds the program for one status row.
///
/// Without sound, steady is 100 ticks on and blink is 10/10.  With sound the
/// tone name is looked up in `catalog` (falling back to index 0), steady
/// stays on for a tenth of the tone length in ticks, and blink splits the
/// tone length evenly between on and off.  Tick counts saturate at 255.
pub fn plan_program(
    profile: &StatusProfile,
    pattern: Pattern,
    audio: AudioChoice,
    catalog: &ToneCatalog,
) -> ProgramPlan {
    let (mut on, mut off) = match pattern {
        Pattern::Steady => (STEADY_TICKS, 0),
        Pattern::Blink => (BLINK_TICKS, BLINK_TICKS),
    };
    let mut step = ProgramStep::jump(profile.color).with_repeat(REPEAT_COUNT);

    let tone = profile
        .audio(audio)
        .filter(|&(_, level)| level > 0.0)
        .and_then(|(name, level)| {
            let index = catalog.index_of(name).unwrap_or(0);
            catalog
                .duration_ms(index)
                .map(|duration| (index, duration, level))
        });
    if let Some((index, duration_ms, level)) = tone {
        (on, off) = match pattern {
            Pattern::Steady => (saturating_ticks(duration_ms / 10), 0),
            Pattern::Blink => {
                let half = saturating_ticks(duration_ms / 2 / 100);
                (half, half)
            }
        };
        step = step.with_audio(index as u8, device_volume(level));
    }

    let step = step.with_timing(on, off);
    let cycle_ticks = u32::from(on) + u32::from(off);
    ProgramPlan {
        step,
        refresh_every: TICK * cycle_ticks * u32::from(REPEAT_COUNT),
    }
}

fn saturating_ticks(ticks: u32) -> u8 {
    ticks.min(u32::from(u8::MAX)) as u8
}

/// Public view of one device's schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub device: String,
    pub refresh_every_ms: u64,
    pub auto_off: bool,
}

/// The live work for one device.  Dropping it cancels both timers.
#[derive(Debug)]
struct ScheduledProgram {
    step: ProgramStep,
    refresh_every: Duration,
    repeat: TimerHandle,
    auto_off: Option<TimerHandle>,
}

/// Owns every device's schedule.
#[derive(Debug)]
pub struct ProgramScheduler {
    schedules: HashMap<String, ScheduledProgram>,
    timers: LoopHandle,
}

impl ProgramScheduler {
    pub fn new(timers: LoopHandle) -> Self {
        Self {
            schedules: HashMap::new(),
            timers,
        }
    }

    /// Applies a request.  Invalid requests are logged and ignored.
    ///
    /// Validation order: device, then pattern, then state.
    pub fn request_state(&mut self, directory: &mut DeviceDirectory, request: &StateRequest) {
        info!(
            "change: device: {}, state: {}, type: {}, duration: {}",
            request.device,
            request.state,
            request.pattern,
            match request.duration_ms {
                0 => "none".to_string(),
                ms => format!("{ms}ms"),
            }
        );
        let Some(session) = directory.get_mut(&request.device) else {
            warn!("invalid requested device {:?}", request.device);
            return;
        };
        let pattern: Pattern = match request.pattern.parse() {
            Ok(p) => p,
            Err(e) => {
                warn!("{e}");
                return;
            }
        };
        let state: DeviceState = match request.state.parse() {
            Ok(s) => s,
            Err(e) => {
                warn!("{e}");
                return;
            }
        };

        let Some(profile) = state.profile() else {
            self.schedules.remove(&request.device);
            session.off();
            return;
        };

        let audio = AudioChoice::from_word(&request.audio);
        let plan = plan_program(&profile, pattern, audio, &session.tone_catalog());
        session.apply_program(&[plan.step]);

        let id = request.device.as_str();
        let scheduled = ScheduledProgram {
            step: plan.step,
            refresh_every: plan.refresh_every,
            repeat: self.timers.every(id, TimerKind::Repeat, plan.refresh_every),
            auto_off: (request.duration_ms > 0).then(|| {
                self.timers.once(
                    id,
                    TimerKind::AutoOff,
                    Duration::from_millis(request.duration_ms),
                )
            }),
        };
        // Replacing the entry drops (and aborts) the previous timers.
        self.schedules.insert(request.device.clone(), scheduled);
    }

    /// Routes a `Repeat` or `AutoOff` firing.  Stale firings are ignored.
    pub fn handle_timer(&mut self, directory: &mut DeviceDirectory, fired: &TimerFired) {
        let Some(scheduled) = self.schedules.get(&fired.device) else {
            debug!("{}: no schedule for {:?} timer", fired.device, fired.kind);
            return;
        };
        match fired.kind {
            TimerKind::Repeat if scheduled.repeat.matches(fired) => {
                let step = scheduled.step;
                match directory.get_mut(&fired.device) {
                    Some(session) => session.apply_program(&[step]),
                    None => {
                        self.schedules.remove(&fired.device);
                    }
                }
            }
            TimerKind::AutoOff
                if scheduled.auto_off.as_ref().is_some_and(|t| t.matches(fired)) =>
            {
                self.schedules.remove(&fired.device);
                if let Some(session) = directory.get_mut(&fired.device) {
                    info!("{}: duration elapsed, turning off", fired.device);
                    session.off();
                }
            }
            _ => debug!("{}: ignoring stale {:?} timer", fired.device, fired.kind),
        }
    }

    /// Drops the schedule for `device`.  Returns `true` if one existed.
    pub fn cancel(&mut self, device: &str) -> bool {
        self.schedules.remove(device).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.schedules.clear();
    }

    pub fn status(&self, device: &str) -> Option<ScheduleStatus> {
        self.schedules.get(device).map(|s| ScheduleStatus {
            device: device.to_string(),
            refresh_every_ms: s.refresh_every.as_millis() as u64,
            auto_off: s.auto_off.is_some(),
        })
    }

    /// Every active schedule, sorted by device id.
    pub fn statuses(&self) -> Vec<ScheduleStatus> {
        let mut ids: Vec<&String> = self.schedules.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.status(id)).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
