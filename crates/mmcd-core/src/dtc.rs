//! Diagnostic trouble code decoding
//!
//! The ECU reports faults as a 16-bit bitmap split over two query
//! addresses (low byte, high byte). Each bit maps to one two-digit
//! blink code.

use serde::Serialize;

/// One diagnostic trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DtcCode {
    /// Bit position in the fault bitmap
    pub bit: u8,
    /// Two-digit blink code
    pub code: &'static str,
    pub description: &'static str,
}

const fn dtc(bit: u8, code: &'static str, description: &'static str) -> DtcCode {
    DtcCode {
        bit,
        code,
        description,
    }
}

/// Bit position to fault code table
pub const DTC_TABLE: [DtcCode; 16] = [
    dtc(0, "11", "Oxygen sensor"),
    dtc(1, "12", "Intake air flow sensor"),
    dtc(2, "13", "Intake air temperature sensor"),
    dtc(3, "14", "Throttle position sensor"),
    dtc(4, "15", "ISC motor position sensor"),
    dtc(5, "21", "Engine coolant temperature sensor"),
    dtc(6, "22", "Engine speed sensor"),
    dtc(7, "23", "TDC sensor"),
    dtc(8, "24", "Vehicle speed sensor"),
    dtc(9, "25", "Barometric pressure sensor"),
    dtc(10, "31", "Knock sensor"),
    dtc(11, "41", "Injector circuit"),
    dtc(12, "42", "Fuel pump relay"),
    dtc(13, "43", "EGR"),
    dtc(14, "44", "Ignition coil"),
    dtc(15, "36", "Ignition circuit"),
];

/// Decode a fault bitmap into the codes whose bit is set, in bit order
pub fn decode_dtcs(bitmap: u16) -> Vec<DtcCode> {
    DTC_TABLE
        .iter()
        .filter(|entry| bitmap & (1 << entry.bit) != 0)
        .copied()
        .collect()
}

/// Active and stored faults read from the ECU
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DtcReport {
    pub active_raw: u16,
    pub stored_raw: u16,
    pub active: Vec<DtcCode>,
    pub stored: Vec<DtcCode>,
}

impl DtcReport {
    /// Build a report from the two raw bitmaps
    pub fn from_bitmaps(active_raw: u16, stored_raw: u16) -> Self {
        Self {
            active_raw,
            stored_raw,
            active: decode_dtcs(active_raw),
            stored: decode_dtcs(stored_raw),
        }
    }

    /// Assemble a bitmap from the low and high bytes as queried
    pub fn bitmap(low: u8, high: u8) -> u16 {
        u16::from(low) | (u16::from(high) << 8)
    }

    pub fn is_clear(&self) -> bool {
        self.active_raw == 0 && self.stored_raw == 0
    }
}
