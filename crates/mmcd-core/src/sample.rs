//! Sensor sample snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensor::{SensorTable, UnitSystem};

/// Number of sensor slots in a sample
pub const MAX_SENSORS: usize = 32;

/// Divisor of the injector duty-cycle formula
const DUTY_CYCLE_DIVISOR: u32 = 117;

/// One synchronized snapshot of raw sensor readings
///
/// A raw byte is only meaningful when its presence bit is set. Accessors
/// return `None` for absent slots so "no data" can never be confused with
/// a reading of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    time: DateTime<Utc>,
    present: u32,
    raw: [u8; MAX_SENSORS],
}

impl Sample {
    /// Create an empty sample stamped with `time`
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time,
            present: 0,
            raw: [0; MAX_SENSORS],
        }
    }

    /// Create an empty sample stamped with the current time
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Rebuild a sample from its stored representation (codecs)
    pub fn from_parts(time: DateTime<Utc>, present: u32, raw: [u8; MAX_SENSORS]) -> Self {
        Self { time, present, raw }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Presence bitmask (bit i set when slot i has a value)
    pub fn present_mask(&self) -> u32 {
        self.present
    }

    /// The raw array as stored, including bytes of absent slots
    pub fn raw_bytes(&self) -> &[u8; MAX_SENSORS] {
        &self.raw
    }

    /// Whether slot `idx` carries a value in this sample
    pub fn has(&self, idx: usize) -> bool {
        idx < MAX_SENSORS && self.present & (1 << idx) != 0
    }

    /// Raw value of slot `idx`, or `None` when absent
    pub fn get(&self, idx: usize) -> Option<u8> {
        self.has(idx).then(|| self.raw[idx])
    }

    /// Store a raw value and mark the slot present
    ///
    /// Indices outside the sample are ignored.
    pub fn set(&mut self, idx: usize, value: u8) {
        if idx >= MAX_SENSORS {
            return;
        }
        self.raw[idx] = value;
        self.present |= 1 << idx;
    }

    /// Number of slots present
    pub fn len(&self) -> usize {
        self.present.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.present == 0
    }

    /// Iterate over `(slot, raw)` pairs of present slots in slot order
    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        (0..MAX_SENSORS).filter_map(move |idx| self.get(idx).map(|v| (idx, v)))
    }

    /// Fill in computed slots from the wire-sourced ones
    ///
    /// Must run after every queried slot of the cycle has been set. The
    /// injector duty cycle is `min(255, INJP * RPM / 117)` and stays absent
    /// when either source is absent. Running it twice yields the same
    /// sample.
    pub fn compute_derived(&mut self, table: &SensorTable) {
        let Some(slots) = table.duty_cycle_slots() else {
            return;
        };
        if let (Some(rpm), Some(pulse)) = (self.get(slots.engine_speed), self.get(slots.pulse_width))
        {
            self.set(slots.duty_cycle, injector_duty_cycle(rpm, pulse));
        }
    }

    /// Converted values of every active, present slot as `(slug, value)`
    pub fn converted(&self, table: &SensorTable, units: UnitSystem) -> Vec<(&'static str, f64)> {
        table
            .iter()
            .filter(|(_, def)| def.exists)
            .filter_map(|(idx, def)| self.get(idx).map(|raw| (def.slug, def.convert(raw, units))))
            .collect()
    }

    /// Formatted values of every active, present slot as `(slug, text)`
    pub fn formatted(&self, table: &SensorTable, units: UnitSystem) -> Vec<(&'static str, String)> {
        table
            .iter()
            .filter(|(_, def)| def.exists)
            .filter_map(|(idx, def)| self.get(idx).map(|raw| (def.slug, def.format(raw, units))))
            .collect()
    }
}

/// Injector duty cycle from raw engine-speed and pulse-width bytes
pub fn injector_duty_cycle(engine_speed: u8, pulse_width: u8) -> u8 {
    let value = u32::from(pulse_width) * u32::from(engine_speed) / DUTY_CYCLE_DIVISOR;
    value.min(u32::from(u8::MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SLOT_INJD, SLOT_INJP, SLOT_RPM};

    #[test]
    fn test_absent_slot_is_none_not_zero() {
        let mut sample = Sample::now();
        sample.set(3, 0);
        assert_eq!(sample.get(3), Some(0));
        assert_eq!(sample.get(4), None);
        assert_eq!(sample.get(40), None);
        assert_eq!(sample.len(), 1);
    }

    #[test]
    fn test_set_out_of_range_ignored() {
        let mut sample = Sample::now();
        sample.set(32, 9);
        assert!(sample.is_empty());
    }

    #[test]
    fn test_duty_cycle_formula() {
        let table = SensorTable::default();
        let mut sample = Sample::now();
        sample.set(SLOT_RPM, 100);
        sample.set(SLOT_INJP, 50);
        sample.compute_derived(&table);
        // 50 * 100 / 117 = 42.7 -> 42
        assert_eq!(sample.get(SLOT_INJD), Some(42));
    }

    #[test]
    fn test_duty_cycle_saturates() {
        assert_eq!(injector_duty_cycle(255, 255), 255);
        assert_eq!(injector_duty_cycle(0, 255), 0);
        assert_eq!(injector_duty_cycle(117, 1), 1);
    }

    #[test]
    fn test_duty_cycle_absent_when_source_missing() {
        let table = SensorTable::default();
        let mut sample = Sample::now();
        sample.set(SLOT_RPM, 100);
        sample.compute_derived(&table);
        assert_eq!(sample.get(SLOT_INJD), None);
    }

    #[test]
    fn test_compute_derived_idempotent() {
        let table = SensorTable::default();
        let mut sample = Sample::now();
        sample.set(SLOT_RPM, 200);
        sample.set(SLOT_INJP, 80);
        sample.compute_derived(&table);
        let once = sample;
        sample.compute_derived(&table);
        assert_eq!(once, sample);
    }

    #[test]
    fn test_iter_in_slot_order() {
        let mut sample = Sample::now();
        sample.set(17, 0x40);
        sample.set(4, 0x66);
        let pairs: Vec<_> = sample.iter().collect();
        assert_eq!(pairs, vec![(4, 0x66), (17, 0x40)]);
    }

    #[test]
    fn test_formatted_skips_absent() {
        let table = SensorTable::default();
        let mut sample = Sample::now();
        sample.set(SLOT_RPM, 32);
        let values = sample.formatted(&table, UnitSystem::Metric);
        assert_eq!(values, vec![("RPM", "1000rpm".to_string())]);
    }
}
