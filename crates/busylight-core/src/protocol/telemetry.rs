//! Device-to-host status reports.
//!
//! The firmware answers with an input report of ASCII fields at fixed
//! offsets:
//!
//! | bytes  | field            |
//! |--------|------------------|
//! | 0      | activity `1`/`0` |
//! | 1..=3  | product code     |
//! | 4..=11 | customer         |
//! | 12..=15| model            |
//! | 16..=23| serial           |
//! | 24..=31| manufacturer     |
//! | 32..=39| build date       |
//! | 40..=45| software version |

use serde::{Deserialize, Serialize};

/// Product family reported in bytes 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    /// Product code `"001"`.
    Busylight,
    /// Any other code.
    KuandoBox,
}

/// Decoded status report.  All fields are empty until the first report
/// arrives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub activity: Option<bool>,
    pub product: Option<ProductKind>,
    pub customer: String,
    pub model: String,
    pub serial: String,
    pub manufacturer: String,
    pub build_date: String,
    pub software_version: String,
}

impl TelemetryReport {
    /// `true` when nothing has been decoded yet.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
