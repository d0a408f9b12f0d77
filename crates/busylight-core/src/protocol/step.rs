//! Program steps: the instructions the firmware stores and loops through.
//!
//! A device holds up to seven steps.  Each step shows one color for
//! `on_ticks` tenths of a second, goes dark for `off_ticks`, optionally plays
//! a tone, and then continues at the step named by its jump target.  The
//! `repeat` field tells the firmware how many times to run the step before
//! moving on.
//!
//! Steps are built with the named constructors below rather than by filling
//! in every field at each call site.

use crate::domain::color::Rgb;

/// Command tag stored in the upper nibble of a step's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepCommand {
    Keepalive,
    Bootloader,
    Reset,
    /// Run this step, then continue at the step index in `command_arg`.
    Jump,
    /// A tag the firmware does not know.  Never written to the wire.
    Unrecognized(u8),
}

impl StepCommand {
    /// Wire tag, or `None` for [`StepCommand::Unrecognized`].
    pub fn tag(self) -> Option<u8> {
        match self {
            StepCommand::Keepalive => Some(0x80),
            StepCommand::Bootloader => Some(0x40),
            StepCommand::Reset => Some(0x20),
            StepCommand::Jump => Some(0x10),
            StepCommand::Unrecognized(_) => None,
        }
    }

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0x80 => StepCommand::Keepalive,
            0x40 => StepCommand::Bootloader,
            0x20 => StepCommand::Reset,
            0x10 => StepCommand::Jump,
            other => StepCommand::Unrecognized(other),
        }
    }
}

/// One 8-byte program step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramStep {
    pub command: StepCommand,
    /// 4-bit argument; for [`StepCommand::Jump`] the next step index.
    pub command_arg: u8,
    pub repeat: u8,
    pub color: Rgb,
    pub on_ticks: u8,
    pub off_ticks: u8,
    pub audio: bool,
    /// 4-bit tone index; `None` arms the buzzer without choosing a tone.
    pub tone: Option<u8>,
    /// 3-bit volume; `0` is silent.
    pub volume: u8,
}

/// Number of ramp steps produced by [`ProgramStep::pulse_ramp`].
pub const PULSE_RAMP_LEN: usize = 8;

impl ProgramStep {
    /// A jump-to-0 step showing `color` with every other field zeroed.
    pub const fn jump(color: Rgb) -> Self {
        Self {
            command: StepCommand::Jump,
            command_arg: 0,
            repeat: 0,
            color,
            on_ticks: 0,
            off_ticks: 0,
            audio: false,
            tone: None,
            volume: 0,
        }
    }

    /// Constant light.
    pub const fn solid(color: Rgb) -> Self {
        Self::jump(color).with_timing(0xFF, 0x00)
    }

    /// Light on for `on_ticks`, dark for `off_ticks`, looping.
    pub const fn blink(color: Rgb, on_ticks: u8, off_ticks: u8) -> Self {
        Self::jump(color).with_timing(on_ticks, off_ticks)
    }

    /// Buzzer armed, no tone selected, light dark.
    ///
    /// Sent before a real tone so the firmware restarts playback, and after a
    /// one-shot tone to silence it.
    pub const fn mute(color: Rgb) -> Self {
        let mut step = Self::jump(color);
        step.audio = true;
        step
    }

    /// Plays `tone` at `volume` with the light held on.
    pub const fn tone(color: Rgb, tone: u8, volume: u8) -> Self {
        Self::jump(color)
            .with_timing(0xFF, 0x00)
            .with_audio(tone, volume)
    }

    /// Triangular brightness ramp: quarters rising 1/4..4/4, then sevenths
    /// falling 5/7..2/7, each step jumping to the next and the seventh back
    /// to the first.
    ///
    /// Returns eight steps; only seven fit on the device, so the last is
    /// dropped when encoded.
    pub fn pulse_ramp(color: Rgb) -> Vec<ProgramStep> {
        let rising = (1..=4).map(|n| color.fraction(n, 4));
        let falling = (2..=5).rev().map(|n| color.fraction(n, 7));
        rising
            .chain(falling)
            .enumerate()
            .map(|(index, shade)| {
                let next = if index < 6 { index as u8 + 1 } else { 0 };
                Self::jump(shade).with_timing(1, 0).with_jump_target(next)
            })
            .collect()
    }

    pub const fn with_timing(mut self, on_ticks: u8, off_ticks: u8) -> Self {
        self.on_ticks = on_ticks;
        self.off_ticks = off_ticks;
        self
    }

    pub const fn with_repeat(mut self, repeat: u8) -> Self {
        self.repeat = repeat;
        self
    }

    pub const fn with_jump_target(mut self, index: u8) -> Self {
        self.command_arg = index;
        self
    }

    pub const fn with_audio(mut self, tone: u8, volume: u8) -> Self {
        self.audio = true;
        self.tone = Some(tone);
        self.volume = volume;
        self
    }
}
