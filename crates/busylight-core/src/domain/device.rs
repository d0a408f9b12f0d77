//! Device descriptors, operator aliases, and logical device ids.
//!
//! # Logical ids (for beginners)
//!
//! The hardware serial number is stable but unfriendly.  Operators may map a
//! serial to a short name with an alias such as `desk:B1A2C3D4`.  Devices
//! without an alias get a short deterministic id derived from the serial:
//! a name-based (version 3) UUID of `busylight:<serial>` in the URL
//! namespace, XOR-folded in half three times down to two bytes and printed
//! as four upper-case hex digits.  The same serial always yields the same id,
//! on every host, across restarts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::model::{self, BusylightModel};

/// One attached HID device as reported by enumeration.
///
/// Immutable; a new descriptor is produced on every enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Platform path used to open the device.
    pub path: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub product: String,
}

impl DeviceDescriptor {
    /// `true` when the vendor/product pair is a supported Busylight.
    pub fn is_busylight(&self) -> bool {
        model::is_supported(self.vendor_id, self.product_id)
    }

    pub fn model(&self) -> Option<BusylightModel> {
        BusylightModel::from_product_id(self.product_id)
    }
}

/// Error returned for a malformed `name:serial` alias.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AliasError {
    #[error("invalid device specification: {0:?} (expected <name>:<serial>)")]
    Malformed(String),
}

/// Operator override mapping a hardware serial to a logical id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAlias {
    pub name: String,
    pub serial: String,
}

impl FromStr for DeviceAlias {
    type Err = AliasError;

    /// Splits at the first colon after a non-empty name.  Both halves must be
    /// non-empty; the serial may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AliasError::Malformed(s.to_string());
        if s.contains('\n') {
            return Err(malformed());
        }
        let first = s.chars().next().ok_or_else(malformed)?;
        let offset = first.len_utf8();
        let colon = s[offset..].find(':').ok_or_else(malformed)? + offset;
        let (name, serial) = (&s[..colon], &s[colon + 1..]);
        if serial.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            name: name.to_string(),
            serial: serial.to_string(),
        })
    }
}

impl fmt::Display for DeviceAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.serial)
    }
}

/// Computes the logical id for `serial`.
///
/// The first alias whose serial matches wins; otherwise the folded-UUID id
/// is returned.
///
/// # Examples
///
/// ```rust
/// use busylight_core::{logical_device_id, DeviceAlias};
///
/// let aliases: Vec<DeviceAlias> = vec!["desk:ABC".parse().unwrap()];
/// assert_eq!(logical_device_id("ABC", &aliases), "desk");
/// assert_eq!(logical_device_id("XYZ", &aliases).len(), 4);
/// ```
pub fn logical_device_id(serial: &str, aliases: &[DeviceAlias]) -> String {
    if let Some(alias) = aliases.iter().find(|a| a.serial == serial) {
        return alias.name.clone();
    }
    folded_serial_id(serial)
}

fn folded_serial_id(serial: &str) -> String {
    let uuid = Uuid::new_v3(&Uuid::NAMESPACE_URL, format!("busylight:{serial}").as_bytes());
    let mut bytes = uuid.as_bytes().to_vec();
    for _ in 0..3 {
        let half = bytes.len() / 2;
        bytes = (0..half).map(|i| bytes[i] ^ bytes[i + half]).collect();
    }
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
