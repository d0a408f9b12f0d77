//! Supported hardware models and their tone catalogs.
//!
//! Every Busylight enumerates with vendor id `0x27BB`.  The product id
//! identifies the model, and the model determines which ringtones the
//! firmware knows.  All models share the same eleven tones except the
//! Omega model 2 (`0x3BCF`), which adds a twelfth.
//!
//! The tables are kept as data rather than as per-model branches so a new
//! variant only needs a new row.

/// USB vendor id shared by every supported device.
pub const VENDOR_ID: u16 = 0x27BB;

/// Product ids accepted during discovery.
pub const PRODUCT_IDS: [u16; 6] = [0x3BCA, 0x3BCB, 0x3BCC, 0x3BCD, 0x3BCE, 0x3BCF];

/// Returns `true` when the vendor/product pair belongs to a supported model.
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID && PRODUCT_IDS.contains(&product_id)
}

/// One ringtone: display name and natural playback length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub name: &'static str,
    pub duration_ms: u32,
}

const fn tone(name: &'static str, duration_ms: u32) -> Tone {
    Tone { name, duration_ms }
}

const STANDARD_TONES: [Tone; 11] = [
    tone("Twinkling", 5700),
    tone("Open Office", 2400),
    tone("Quiet", 2400),
    tone("Funky", 3000),
    tone("Fairy Tale", 4500),
    tone("Kuando Train", 3900),
    tone("Telephone Nordic", 3500),
    tone("Telephone Original", 2200),
    tone("Telephone Pick Me Up", 2200),
    tone("Instant Message 1", 2000),
    tone("Instant Message 2", 2000),
];

const EXTENDED_TONES: [Tone; 12] = [
    tone("Twinkling", 5700),
    tone("Open Office", 2400),
    tone("Quiet", 2400),
    tone("Funky", 3000),
    tone("Fairy Tale", 4500),
    tone("Kuando Train", 3900),
    tone("Telephone Nordic", 3500),
    tone("Telephone Original", 2200),
    tone("Telephone Pick Me Up", 2200),
    tone("Instant Message 1", 2000),
    tone("Instant Message 2", 2000),
    tone("Instant Message 3", 2400),
];

/// The ordered list of tones a model can play.  Indices are the 4-bit tone
/// numbers written into program steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneCatalog {
    tones: &'static [Tone],
}

impl ToneCatalog {
    /// A catalog with no tones (used when no model is bound).
    pub const EMPTY: ToneCatalog = ToneCatalog { tones: &[] };

    pub fn len(&self) -> usize {
        self.tones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tone> {
        self.tones.get(index)
    }

    /// Index of the tone called `name` (exact match).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.tones.iter().position(|t| t.name == name)
    }

    /// Playback length of the tone at `index`, if the model has it.
    pub fn duration_ms(&self, index: usize) -> Option<u32> {
        self.get(index).map(|t| t.duration_ms)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tones.iter().map(|t| t.name).collect()
    }

    pub fn durations(&self) -> Vec<u32> {
        self.tones.iter().map(|t| t.duration_ms).collect()
    }
}

/// A supported hardware model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusylightModel {
    pub product_id: u16,
    pub name: &'static str,
    pub tones: ToneCatalog,
}

const MODELS: [BusylightModel; 6] = [
    model(0x3BCA, "Busylight Alpha model", &STANDARD_TONES),
    model(0x3BCB, "Busylight UC model", &STANDARD_TONES),
    model(0x3BCC, "Busylight UC model", &STANDARD_TONES),
    model(0x3BCD, "Busylight Omega model", &STANDARD_TONES),
    model(0x3BCE, "Busylight Alpha model 2", &STANDARD_TONES),
    model(0x3BCF, "Busylight Omega model 2", &EXTENDED_TONES),
];

const fn model(product_id: u16, name: &'static str, tones: &'static [Tone]) -> BusylightModel {
    BusylightModel {
        product_id,
        name,
        tones: ToneCatalog { tones },
    }
}

impl BusylightModel {
    /// Looks up the model for a product id.
    pub fn from_product_id(product_id: u16) -> Option<BusylightModel> {
        MODELS.iter().copied().find(|m| m.product_id == product_id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listed_product_has_a_model() {
        for pid in PRODUCT_IDS {
            assert!(BusylightModel::from_product_id(pid).is_some(), "pid {pid:#06X}");
        }
    }

    #[test]
    fn test_unknown_product_has_no_model() {
        assert!(BusylightModel::from_product_id(0x1234).is_none());
    }

    #[test]
    fn test_only_omega_2_has_twelve_tones() {
        for pid in PRODUCT_IDS {
            let model = BusylightModel::from_product_id(pid).unwrap();
            let expected = if pid == 0x3BCF { 12 } else { 11 };
            assert_eq!(model.tones.len(), expected, "pid {pid:#06X}");
        }
    }

    #[test]
    fn test_tone_lookup_by_name() {
        let model = BusylightModel::from_product_id(0x3BCD).unwrap();
        assert_eq!(model.tones.index_of("Quiet"), Some(2));
        assert_eq!(model.tones.index_of("Instant Message 2"), Some(10));
        assert_eq!(model.tones.index_of("Instant Message 3"), None);
        assert_eq!(model.tones.duration_ms(0), Some(5700));
        assert_eq!(model.tones.duration_ms(11), None);
    }

    #[test]
    fn test_extended_catalog_twelfth_tone() {
        let model = BusylightModel::from_product_id(0x3BCF).unwrap();
        assert_eq!(model.tones.index_of("Instant Message 3"), Some(11));
        assert_eq!(model.tones.duration_ms(11), Some(2400));
    }

    #[test]
    fn test_is_supported_checks_vendor_and_product() {
        assert!(is_supported(0x27BB, 0x3BCA));
        assert!(!is_supported(0x27BB, 0x3BC9));
        assert!(!is_supported(0x1234, 0x3BCA));
    }

    #[test]
    fn test_model_names() {
        assert_eq!(BusylightModel::from_product_id(0x3BCB).unwrap().name, "Busylight UC model");
        assert_eq!(
            BusylightModel::from_product_id(0x3BCE).unwrap().name,
            "Busylight Alpha model 2"
        );
    }
}
