//! Raw byte to engineering value conversions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unit system used for temperatures and pressures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Celsius, bar
    #[default]
    Metric,
    /// Fahrenheit, psi
    English,
    /// Raw decimal value
    Raw,
}

impl UnitSystem {
    /// Tag stored in the native log header
    pub fn to_tag(self) -> u8 {
        match self {
            UnitSystem::Metric => 0,
            UnitSystem::English => 1,
            UnitSystem::Raw => 2,
        }
    }

    /// Parse a header tag; unknown tags fall back to metric
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => UnitSystem::English,
            2 => UnitSystem::Raw,
            _ => UnitSystem::Metric,
        }
    }
}

impl FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "english" | "imperial" => Ok(UnitSystem::English),
            "raw" | "numeric" => Ok(UnitSystem::Raw),
            other => Err(format!("unknown unit system: {other}")),
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitSystem::Metric => "metric",
            UnitSystem::English => "english",
            UnitSystem::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// Air intake temperature interpolation table (offset -60 C)
const AIR_TEMP_INTERP: [u8; 17] = [
    0xF4, 0xB0, 0x91, 0x80, 0x74, 0x6A, 0x62, 0x5A, 0x53, 0x4C, 0x45, 0x3E, 0x35, 0x2B, 0x1D,
    0x01, 0x01,
];

/// Coolant temperature interpolation table (offset -80 C)
const COOLANT_TEMP_INTERP: [u8; 17] = [
    0xEE, 0xBE, 0xA0, 0x90, 0x84, 0x7B, 0x73, 0x6C, 0x65, 0x5F, 0x58, 0x51, 0x49, 0x40, 0x33,
    0x15, 0x15,
];

/// How a slot's raw byte maps to an engineering value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// Raw decimal 0..255
    Decimal,
    /// Raw hexadecimal
    Hex,
    /// Flags at 0x00 (AC clutch)
    Flags0,
    /// Flags at 0x02 (TDC, P/S, AC, P/N, idle)
    Flags2,
    /// Interpolated air intake temperature
    AirTemp,
    /// Interpolated coolant temperature
    CoolantTemp,
    /// EGR temperature, -1.5x + 314.27 C
    EgrTemp,
    /// Battery, 0.0733x V
    Battery,
    /// Engine speed, 31.25x rpm
    EngineSpeed,
    /// Injector pulse width, 0.256x ms
    InjectorPulse,
    /// Barometer, 0.00486x bar
    Barometer,
    /// Mass air flow frequency, 6.29x Hz
    AirFlow,
    /// Percentage, 100x/255
    Percent,
    /// Fuel trim, 100x/128
    FuelTrim,
    /// Oxygen sensor, 0.0195x V
    Oxygen,
    /// Timing advance, x - 10 degrees
    TimingAdvance,
}

impl Conversion {
    /// Convert a raw byte to a number in `units`
    pub fn convert(self, raw: u8, units: UnitSystem) -> f64 {
        self.apply(raw, units).0
    }

    /// Convert a raw byte to display text in `units`
    pub fn format(self, raw: u8, units: UnitSystem) -> String {
        self.apply(raw, units).1
    }

    fn apply(self, raw: u8, units: UnitSystem) -> (f64, String) {
        let x = f64::from(raw);
        match self {
            Conversion::Decimal => decimal(raw),
            Conversion::Hex => (x, format!("{raw:02x}")),
            Conversion::Flags0 => (x, flag(raw & 0x20 == 0, 'A').to_string()),
            Conversion::Flags2 => {
                let flags: String = [
                    flag(raw & 0x04 == 0, 'T'),
                    flag(raw & 0x08 != 0, 'S'),
                    flag(raw & 0x10 == 0, 'A'),
                    flag(raw & 0x20 == 0, 'N'),
                    flag(raw & 0x80 != 0, 'I'),
                ]
                .iter()
                .collect();
                (x, flags)
            }
            Conversion::AirTemp => temperature(raw, units, || interpolate(&AIR_TEMP_INTERP, raw) - 60.0),
            Conversion::CoolantTemp => {
                temperature(raw, units, || interpolate(&COOLANT_TEMP_INTERP, raw) - 80.0)
            }
            Conversion::EgrTemp => temperature(raw, units, || -1.5 * x + 314.27),
            Conversion::Battery => {
                let v = 0.0733 * x;
                (v, format!("{v:.1}V"))
            }
            Conversion::EngineSpeed => {
                let v = 31.25 * x;
                (v, format!("{v:.0}rpm"))
            }
            Conversion::InjectorPulse => {
                let v = 0.256 * x;
                (v, format!("{v:.2}ms"))
            }
            Conversion::Barometer => match units {
                UnitSystem::Raw => decimal(raw),
                UnitSystem::English => {
                    let psi = 0.00486 * x * 14.50326;
                    (psi, format!("{psi:.2}psi"))
                }
                UnitSystem::Metric => {
                    let bar = 0.00486 * x;
                    (bar, format!("{bar:.3}bar"))
                }
            },
            Conversion::AirFlow => {
                let v = 6.29 * x;
                (v, format!("{v:.1}Hz"))
            }
            Conversion::Percent => {
                let v = 100.0 * x / 255.0;
                (v, format!("{v:.1}%"))
            }
            Conversion::FuelTrim => {
                let v = 100.0 * x / 128.0;
                (v, format!("{v:.1}%"))
            }
            Conversion::Oxygen => {
                let v = 0.0195 * x;
                (v, format!("{v:.3}V"))
            }
            Conversion::TimingAdvance => {
                let v = x - 10.0;
                (v, format!("{v:.0}\u{b0}"))
            }
        }
    }
}

fn decimal(raw: u8) -> (f64, String) {
    (f64::from(raw), raw.to_string())
}

fn flag(set: bool, letter: char) -> char {
    if set {
        letter
    } else {
        '-'
    }
}

fn interpolate(table: &[u8; 17], raw: u8) -> f64 {
    let idx = usize::from(raw / 16);
    let rem = f64::from(raw % 16);
    let v1 = f64::from(table[idx]);
    let v2 = f64::from(table[idx + 1]);
    v1 - rem * (v1 - v2) / 16.0
}

fn temperature(raw: u8, units: UnitSystem, celsius: impl FnOnce() -> f64) -> (f64, String) {
    match units {
        UnitSystem::Raw => decimal(raw),
        UnitSystem::English => {
            let f = celsius() * 9.0 / 5.0 + 32.0;
            (f, format!("{f:.1}\u{b0}F"))
        }
        UnitSystem::Metric => {
            let c = celsius();
            (c, format!("{c:.1}\u{b0}C"))
        }
    }
}
