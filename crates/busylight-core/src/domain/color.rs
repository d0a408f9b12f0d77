//! RGB colors as accepted from callers and as packed into program steps.
//!
//! Callers describe colors as six hex digits with an optional leading `#`
//! (`"#00FF80"`, `"00ff80"`).  Anything after the sixth digit is ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a color string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    /// The input was empty (or only a `#`).
    #[error("color string is empty")]
    Empty,

    /// Fewer than six hex digits were supplied.
    #[error("color string too short: need 6 hex digits, got {len}")]
    TooShort { len: usize },

    /// One of the three channel pairs is not valid hexadecimal.
    #[error("invalid hex color: {0:?}")]
    InvalidHex(String),
}

/// An 8-bit-per-channel color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    /// All channels zero.
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Scales every channel by `percent` (clamped to 0..=100) using
    /// truncating integer division, so 255 at 50% becomes 127.
    pub fn scaled(self, percent: u8) -> Self {
        let percent = u32::from(percent.min(100));
        let scale = |c: u8| (u32::from(c) * percent / 100) as u8;
        Self::new(scale(self.red), scale(self.green), scale(self.blue))
    }

    /// Returns `self * numerator / denominator` per channel, truncated.
    ///
    /// Used for the brightness ramp of the pulse pattern.
    pub fn fraction(self, numerator: u8, denominator: u8) -> Self {
        if denominator == 0 {
            return Self::BLACK;
        }
        let part = |c: u8| (u32::from(c) * u32::from(numerator) / u32::from(denominator)) as u8;
        Self::new(part(self.red), part(self.green), part(self.blue))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }
}

impl FromStr for Rgb {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_color(s)
    }
}

/// Parses a six-digit hex color with an optional leading `#`.
///
/// # Errors
///
/// Returns [`ColorError`] when the string is empty, shorter than six digits,
/// or contains a non-hex character in the first six positions.
///
/// # Examples
///
/// ```rust
/// use busylight_core::{parse_color, Rgb};
///
/// assert_eq!(parse_color("#00FF80").unwrap(), Rgb::new(0, 255, 128));
/// assert!(parse_color("00FF8").is_err());
/// ```
pub fn parse_color(input: &str) -> Result<Rgb, ColorError> {
    let digits = input.strip_prefix('#').unwrap_or(input);
    if digits.is_empty() {
        return Err(ColorError::Empty);
    }
    if digits.len() < 6 {
        return Err(ColorError::TooShort { len: digits.len() });
    }

    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .ok_or_else(|| ColorError::InvalidHex(input.to_string()))
    };

    Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
