//! Sensor definition table
//!
//! Slot indices are fixed: they are what the native and legacy log formats
//! store, so the table layout must not change.

mod convert;

pub use convert::{Conversion, UnitSystem};

use serde::Serialize;

use crate::sample::MAX_SENSORS;

/// Engine speed slot
pub const SLOT_RPM: usize = 17;
/// Injector pulse width slot
pub const SLOT_INJP: usize = 19;
/// Injector duty cycle slot (computed, never queried)
pub const SLOT_INJD: usize = 20;

/// Slugs logged by default when the user does not pick sensors
pub const COMMON_SLUGS: &[&str] = &["RPM", "TPS", "COOL", "TIMA", "KNCK", "INJP", "O2-R", "BATT"];

/// One sensor slot
#[derive(Debug, Clone, Serialize)]
pub struct SensorDefinition {
    /// ECU address, `None` when the slot is not queried
    pub address: Option<u8>,
    /// Short name (up to 4 characters)
    pub slug: &'static str,
    pub description: &'static str,
    /// Display unit
    pub unit: &'static str,
    /// Whether the slot is active
    pub exists: bool,
    /// Derived from other slots instead of queried
    pub computed: bool,
    pub conversion: Conversion,
}

impl SensorDefinition {
    const fn polled(
        address: u8,
        slug: &'static str,
        description: &'static str,
        unit: &'static str,
        conversion: Conversion,
    ) -> Self {
        Self {
            address: Some(address),
            slug,
            description,
            unit,
            exists: true,
            computed: false,
            conversion,
        }
    }

    const fn unused(address: Option<u8>) -> Self {
        Self {
            address,
            slug: "",
            description: "",
            unit: "",
            exists: false,
            computed: false,
            conversion: Conversion::Decimal,
        }
    }

    /// ECU address if this slot is queried over the wire
    pub fn query_address(&self) -> Option<u8> {
        if self.exists && !self.computed {
            self.address
        } else {
            None
        }
    }

    pub fn convert(&self, raw: u8, units: UnitSystem) -> f64 {
        self.conversion.convert(raw, units)
    }

    pub fn format(&self, raw: u8, units: UnitSystem) -> String {
        self.conversion.format(raw, units)
    }
}

/// Slots involved in the injector duty-cycle computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCycleSlots {
    pub engine_speed: usize,
    pub pulse_width: usize,
    pub duty_cycle: usize,
}

/// The 32-slot sensor table
#[derive(Debug, Clone)]
pub struct SensorTable {
    defs: Vec<SensorDefinition>,
    duty_cycle: Option<DutyCycleSlots>,
}

impl Default for SensorTable {
    fn default() -> Self {
        Self::new(default_definitions())
    }
}

impl SensorTable {
    /// Build a table from explicit definitions
    ///
    /// Missing trailing slots are filled with inactive entries; extra
    /// entries beyond 32 are dropped.
    pub fn new(mut defs: Vec<SensorDefinition>) -> Self {
        defs.truncate(MAX_SENSORS);
        while defs.len() < MAX_SENSORS {
            defs.push(SensorDefinition::unused(None));
        }
        let find = |slug: &str| defs.iter().position(|d| d.slug == slug);
        let duty_cycle = match (find("RPM"), find("INJP"), find("INJD")) {
            (Some(engine_speed), Some(pulse_width), Some(duty_cycle)) => Some(DutyCycleSlots {
                engine_speed,
                pulse_width,
                duty_cycle,
            }),
            _ => None,
        };
        Self { defs, duty_cycle }
    }

    pub fn get(&self, idx: usize) -> Option<&SensorDefinition> {
        self.defs.get(idx)
    }

    /// Iterate over `(slot, definition)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SensorDefinition)> {
        self.defs.iter().enumerate()
    }

    /// Address to query for slot `idx`, if it is active, wire-sourced and addressable
    pub fn query_address(&self, idx: usize) -> Option<u8> {
        self.defs.get(idx).and_then(SensorDefinition::query_address)
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<(usize, &SensorDefinition)> {
        self.iter()
            .find(|(_, d)| !d.slug.is_empty() && d.slug.eq_ignore_ascii_case(slug))
    }

    pub fn find_by_address(&self, address: u8) -> Option<(usize, &SensorDefinition)> {
        self.iter()
            .find(|(_, d)| d.exists && d.address == Some(address))
    }

    /// Resolve slugs to slot indices
    ///
    /// Returns the resolved indices and the slugs that matched nothing.
    pub fn slugs_to_indices<S: AsRef<str>>(&self, slugs: &[S]) -> (Vec<usize>, Vec<String>) {
        let mut indices = Vec::new();
        let mut unknown = Vec::new();
        for slug in slugs {
            match self.find_by_slug(slug.as_ref()) {
                Some((idx, _)) => indices.push(idx),
                None => unknown.push(slug.as_ref().to_string()),
            }
        }
        (indices, unknown)
    }

    /// Every slot that can be queried over the wire
    pub fn pollable_indices(&self) -> Vec<usize> {
        (0..self.defs.len())
            .filter(|&idx| self.query_address(idx).is_some())
            .collect()
    }

    /// The default logging subset
    pub fn common_indices(&self) -> Vec<usize> {
        self.slugs_to_indices(COMMON_SLUGS).0
    }

    /// Slots used by the duty-cycle computation, if the table defines all three
    pub fn duty_cycle_slots(&self) -> Option<DutyCycleSlots> {
        self.duty_cycle
    }

    /// `indices` plus the derived duty-cycle slot when both of its sources
    /// are included, sorted and without duplicates
    pub fn with_derived(&self, indices: &[usize]) -> Vec<usize> {
        let mut out = indices.to_vec();
        if let Some(slots) = self.duty_cycle {
            if out.contains(&slots.engine_speed) && out.contains(&slots.pulse_width) {
                out.push(slots.duty_cycle);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

fn default_definitions() -> Vec<SensorDefinition> {
    use Conversion::*;

    let mut defs = vec![
        SensorDefinition::unused(None),
        SensorDefinition::polled(0x00, "FLG0", "Flags 0 (AC clutch)", "flags", Flags0),
        SensorDefinition::polled(0x02, "FLG2", "Flags 2 (TDC/PS/AC/PN/Idle)", "flags", Flags2),
        SensorDefinition::polled(0x06, "TIMA", "Timing advance", "deg", TimingAdvance),
        SensorDefinition::polled(0x07, "COOL", "Coolant temp", "deg", CoolantTemp),
        SensorDefinition::polled(0x0C, "FTRL", "Fuel trim low", "%", FuelTrim),
        SensorDefinition::polled(0x0D, "FTRM", "Fuel trim middle", "%", FuelTrim),
        SensorDefinition::polled(0x0E, "FTRH", "Fuel trim high", "%", FuelTrim),
        SensorDefinition::polled(0x0F, "FTO2", "O2 feedback trim", "%", FuelTrim),
        SensorDefinition::polled(0x12, "EGRT", "EGR temp", "deg", EgrTemp),
        SensorDefinition::polled(0x13, "O2-R", "O2 sensor (rear)", "V", Oxygen),
        SensorDefinition::polled(0x14, "BATT", "Battery", "V", Battery),
        SensorDefinition::polled(0x15, "BARO", "Barometer", "bar", Barometer),
        SensorDefinition::polled(0x16, "ISC", "ISC position", "%", Percent),
        SensorDefinition::polled(0x17, "TPS", "Throttle position", "%", Percent),
        SensorDefinition::polled(0x1A, "MAFS", "Mass air flow", "Hz", AirFlow),
        SensorDefinition::polled(0x1D, "ACLE", "Accel enrichment", "%", Percent),
        SensorDefinition::polled(0x21, "RPM", "Engine speed", "rpm", EngineSpeed),
        SensorDefinition::polled(0x26, "KNCK", "Knock sum", "count", Decimal),
        SensorDefinition::polled(0x29, "INJP", "Inj pulse width", "ms", InjectorPulse),
        SensorDefinition {
            address: None,
            slug: "INJD",
            description: "Inj duty cycle",
            unit: "%",
            exists: true,
            computed: true,
            conversion: FuelTrim,
        },
        SensorDefinition::polled(0x3A, "AIRT", "Air temp", "deg", AirTemp),
        SensorDefinition::polled(0x3E, "O2-F", "O2 sensor (front)", "V", Oxygen),
    ];
    // Spare slots, kept inactive
    let used = defs.len();
    defs.extend((used..MAX_SENSORS).map(|_| SensorDefinition::unused(Some(0x00))));
    defs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_table_shape() {
        let table = SensorTable::default();
        assert_eq!(table.iter().count(), MAX_SENSORS);
        assert_eq!(table.get(SLOT_RPM).unwrap().slug, "RPM");
        assert_eq!(table.get(SLOT_INJP).unwrap().slug, "INJP");
        assert_eq!(table.get(SLOT_INJD).unwrap().slug, "INJD");
        assert!(table.get(SLOT_INJD).unwrap().computed);
        assert!(!table.get(0).unwrap().exists);
        assert!(!table.get(31).unwrap().exists);
    }

    #[test]
    fn test_all_query_addresses_below_command_range() {
        let table = SensorTable::default();
        for idx in table.pollable_indices() {
            assert!(table.query_address(idx).unwrap() < 0xC0);
        }
    }

    #[test]
    fn test_with_derived() {
        let table = SensorTable::default();
        assert_eq!(
            table.with_derived(&[SLOT_INJP, 4, SLOT_RPM]),
            vec![4, SLOT_RPM, SLOT_INJP, SLOT_INJD]
        );
        assert_eq!(table.with_derived(&[SLOT_RPM, 4]), vec![4, SLOT_RPM]);
        assert_eq!(
            table.with_derived(&[SLOT_RPM, SLOT_INJP, SLOT_INJD]),
            vec![SLOT_RPM, SLOT_INJP, SLOT_INJD]
        );
    }

    #[test]
    fn test_computed_and_inactive_not_pollable() {
        let table = SensorTable::default();
        let pollable = table.pollable_indices();
        assert_eq!(pollable.len(), 21);
        assert!(!pollable.contains(&SLOT_INJD));
        assert!(!pollable.contains(&0));
        assert!(!pollable.contains(&25));
        assert_eq!(table.query_address(SLOT_INJD), None);
    }

    #[test]
    fn test_find_by_slug_and_address() {
        let table = SensorTable::default();
        assert_eq!(table.find_by_slug("rpm").map(|(i, _)| i), Some(SLOT_RPM));
        assert_eq!(table.find_by_address(0x29).map(|(i, _)| i), Some(SLOT_INJP));
        assert!(table.find_by_slug("").is_none());
        assert!(table.find_by_address(0xFF).is_none());
    }

    #[test]
    fn test_slugs_to_indices_reports_unknown() {
        let table = SensorTable::default();
        let (indices, unknown) = table.slugs_to_indices(&["RPM", "NOPE", "TPS"]);
        assert_eq!(indices, vec![17, 14]);
        assert_eq!(unknown, vec!["NOPE".to_string()]);
    }

    #[test]
    fn test_common_indices() {
        let table = SensorTable::default();
        assert_eq!(table.common_indices(), vec![17, 14, 4, 3, 18, 19, 10, 11]);
    }

    #[test]
    fn test_duty_cycle_slots() {
        let slots = SensorTable::default().duty_cycle_slots().unwrap();
        assert_eq!(slots.engine_speed, SLOT_RPM);
        assert_eq!(slots.pulse_width, SLOT_INJP);
        assert_eq!(slots.duty_cycle, SLOT_INJD);

        let partial = SensorTable::new(vec![]);
        assert!(partial.duty_cycle_slots().is_none());
    }
}
