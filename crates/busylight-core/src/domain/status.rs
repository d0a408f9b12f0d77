//! Logical status states and the fixed table that turns them into light and
//! sound.
//!
//! | state   | color    | tone (audible)      | volume |
//! |---------|----------|---------------------|--------|
//! | ok      | `006600` | Instant Message 2   | 0.5    |
//! | info1   | `003399` | Instant Message 2   | 0.5    |
//! | info2   | `660066` | Instant Message 2   | 0.5    |
//! | info3   | `999999` | Instant Message 2   | 0.5    |
//! | warning | `993300` | Quiet               | 0.5    |
//! | error   | `CC0000` | Quiet               | 1.0    |
//!
//! `off` has no row: it cancels whatever is scheduled and darkens the device.
//! `info` is accepted as a shorthand for `info1`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::color::Rgb;

/// Errors produced while parsing request fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("invalid requested state {0:?}")]
    UnknownState(String),

    #[error("invalid requested type {0:?}")]
    UnknownPattern(String),
}

/// A status a device can be asked to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Off,
    Ok,
    Info1,
    Info2,
    Info3,
    Warning,
    Error,
}

/// Color and audible tone for one state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusProfile {
    pub color: Rgb,
    pub tone_name: &'static str,
    /// Loudness in `0.0..=1.0`.
    pub volume: f32,
}

impl StatusProfile {
    /// Tone name and loudness to play, or `None` when the request is quiet.
    pub fn audio(&self, choice: AudioChoice) -> Option<(&'static str, f32)> {
        match choice {
            AudioChoice::Audible => Some((self.tone_name, self.volume)),
            AudioChoice::Quiet => None,
        }
    }
}

const fn profile(color: Rgb, tone_name: &'static str, volume: f32) -> StatusProfile {
    StatusProfile {
        color,
        tone_name,
        volume,
    }
}

impl DeviceState {
    /// The display row for this state, `None` for [`DeviceState::Off`].
    pub fn profile(self) -> Option<StatusProfile> {
        let row = match self {
            DeviceState::Off => return None,
            DeviceState::Ok => profile(Rgb::new(0x00, 0x66, 0x00), "Instant Message 2", 0.5),
            DeviceState::Info1 => profile(Rgb::new(0x00, 0x33, 0x99), "Instant Message 2", 0.5),
            DeviceState::Info2 => profile(Rgb::new(0x66, 0x00, 0x66), "Instant Message 2", 0.5),
            DeviceState::Info3 => profile(Rgb::new(0x99, 0x99, 0x99), "Instant Message 2", 0.5),
            DeviceState::Warning => profile(Rgb::new(0x99, 0x33, 0x00), "Quiet", 0.5),
            DeviceState::Error => profile(Rgb::new(0xCC, 0x00, 0x00), "Quiet", 1.0),
        };
        Some(row)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Off => "off",
            DeviceState::Ok => "ok",
            DeviceState::Info1 => "info1",
            DeviceState::Info2 => "info2",
            DeviceState::Info3 => "info3",
            DeviceState::Warning => "warning",
            DeviceState::Error => "error",
        }
    }
}

impl FromStr for DeviceState {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(DeviceState::Off),
            "ok" => Ok(DeviceState::Ok),
            "info" | "info1" => Ok(DeviceState::Info1),
            "info2" => Ok(DeviceState::Info2),
            "info3" => Ok(DeviceState::Info3),
            "warning" => Ok(DeviceState::Warning),
            "error" => Ok(DeviceState::Error),
            other => Err(StatusError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the color is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// Constant light.
    #[default]
    Steady,
    /// On/off at equal intervals.
    Blink,
}

impl FromStr for Pattern {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "steady" => Ok(Pattern::Steady),
            "blink" => Ok(Pattern::Blink),
            other => Err(StatusError::UnknownPattern(other.to_string())),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pattern::Steady => "steady",
            Pattern::Blink => "blink",
        })
    }
}

/// Whether a state change plays its tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioChoice {
    #[default]
    Audible,
    Quiet,
}

impl AudioChoice {
    /// `"audible"` selects sound; every other word means quiet.
    pub fn from_word(word: &str) -> Self {
        if word == "audible" {
            AudioChoice::Audible
        } else {
            AudioChoice::Quiet
        }
    }
}

/// Maps a loudness in `0.0..=1.0` to the device's volume step `1..=7`.
pub fn device_volume(level: f32) -> u8 {
    let level = level.clamp(0.0, 1.0);
    1 + (6.0 * level).round() as u8
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_parse() {
        assert_eq!("off".parse(), Ok(DeviceState::Off));
        assert_eq!("ok".parse(), Ok(DeviceState::Ok));
        assert_eq!("info".parse(), Ok(DeviceState::Info1));
        assert_eq!("info3".parse(), Ok(DeviceState::Info3));
        assert_eq!("error".parse(), Ok(DeviceState::Error));
    }

    #[test]
    fn test_unknown_state_is_rejected() {
        assert_eq!(
            "panic".parse::<DeviceState>(),
            Err(StatusError::UnknownState("panic".into()))
        );
        assert!("OK".parse::<DeviceState>().is_err());
    }

    #[test]
    fn test_pattern_parse_is_exact() {
        assert_eq!("blink".parse(), Ok(Pattern::Blink));
        assert!("Blink".parse::<Pattern>().is_err());
        assert!("steadyish".parse::<Pattern>().is_err());
    }

    #[test]
    fn test_off_has_no_profile() {
        assert!(DeviceState::Off.profile().is_none());
    }

    #[test]
    fn test_error_profile_is_loud_red() {
        let p = DeviceState::Error.profile().unwrap();
        assert_eq!(p.color, Rgb::new(0xCC, 0, 0));
        assert_eq!(p.audio(AudioChoice::Audible), Some(("Quiet", 1.0)));
        assert_eq!(p.audio(AudioChoice::Quiet), None);
    }

    #[test]
    fn test_audio_choice_only_audible_is_audible() {
        assert_eq!(AudioChoice::from_word("audible"), AudioChoice::Audible);
        assert_eq!(AudioChoice::from_word("quiet"), AudioChoice::Quiet);
        assert_eq!(AudioChoice::from_word("loud"), AudioChoice::Quiet);
    }

    #[test]
    fn test_device_volume_mapping() {
        assert_eq!(device_volume(0.0), 1);
        assert_eq!(device_volume(0.5), 4);
        assert_eq!(device_volume(1.0), 7);
        assert_eq!(device_volume(3.0), 7);
    }
}
