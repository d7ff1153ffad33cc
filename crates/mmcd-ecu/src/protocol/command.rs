//! Command addresses and the actuator test catalog

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Erase stored and active diagnostic trouble codes
pub const ERASE_DTC_COMMAND: u8 = 0xCA;

/// Result byte for a completed command
pub const RESULT_OK: u8 = 0x00;

/// Result byte when the ECU refused to run the command (engine running)
pub const RESULT_PRECONDITION_FAILED: u8 = 0xFF;

/// Every address that may be sent as a command
pub const COMMAND_WHITELIST: [u8; 13] = [
    ERASE_DTC_COMMAND,
    0xF1,
    0xF2,
    0xF3,
    0xF4,
    0xF5,
    0xF6,
    0xF7,
    0xF8,
    0xF9,
    0xFA,
    0xFB,
    0xFC,
];

pub fn is_command_allowed(command: u8) -> bool {
    COMMAND_WHITELIST.contains(&command)
}

/// Actuator tests the ECU can run on request
///
/// The ECU drives the component for about six seconds before answering.
/// Solenoid and relay tests only run with the engine off; injector
/// disables only make sense with it running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Actuator {
    Boost,
    Mvic,
    Egr,
    Pressure,
    Purge,
    FuelPump,
    Injector6,
    Injector5,
    Injector4,
    Injector3,
    Injector2,
    Injector1,
}

impl Actuator {
    /// All actuators, solenoids and relays first
    pub const ALL: [Actuator; 12] = [
        Actuator::FuelPump,
        Actuator::Purge,
        Actuator::Pressure,
        Actuator::Egr,
        Actuator::Mvic,
        Actuator::Boost,
        Actuator::Injector1,
        Actuator::Injector2,
        Actuator::Injector3,
        Actuator::Injector4,
        Actuator::Injector5,
        Actuator::Injector6,
    ];

    /// Command address
    pub fn address(self) -> u8 {
        match self {
            Actuator::Boost => 0xF1,
            Actuator::Mvic => 0xF2,
            Actuator::Egr => 0xF3,
            Actuator::Pressure => 0xF4,
            Actuator::Purge => 0xF5,
            Actuator::FuelPump => 0xF6,
            Actuator::Injector6 => 0xF7,
            Actuator::Injector5 => 0xF8,
            Actuator::Injector4 => 0xF9,
            Actuator::Injector3 => 0xFA,
            Actuator::Injector2 => 0xFB,
            Actuator::Injector1 => 0xFC,
        }
    }

    /// Name used on the command line
    pub fn name(self) -> &'static str {
        match self {
            Actuator::Boost => "boost",
            Actuator::Mvic => "mvic",
            Actuator::Egr => "egr",
            Actuator::Pressure => "pressure",
            Actuator::Purge => "purge",
            Actuator::FuelPump => "fuel-pump",
            Actuator::Injector6 => "inj6",
            Actuator::Injector5 => "inj5",
            Actuator::Injector4 => "inj4",
            Actuator::Injector3 => "inj3",
            Actuator::Injector2 => "inj2",
            Actuator::Injector1 => "inj1",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Actuator::Boost => "Boost solenoid",
            Actuator::Mvic => "MVIC motor",
            Actuator::Egr => "EGR solenoid",
            Actuator::Pressure => "Pressure solenoid",
            Actuator::Purge => "Canister purge solenoid",
            Actuator::FuelPump => "Fuel pump relay",
            Actuator::Injector6 => "Disable injector #6",
            Actuator::Injector5 => "Disable injector #5",
            Actuator::Injector4 => "Disable injector #4",
            Actuator::Injector3 => "Disable injector #3",
            Actuator::Injector2 => "Disable injector #2",
            Actuator::Injector1 => "Disable injector #1",
        }
    }

    /// Solenoid and relay tests are refused while the engine runs
    pub fn requires_engine_off(self) -> bool {
        self.address() <= 0xF6
    }

    pub fn from_address(address: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.address() == address)
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Actuator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| format!("unknown actuator test: {s}"))
    }
}

/// How an actuator test ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorOutcome {
    Completed,
    /// The ECU refused (solenoid tests need the engine off)
    PreconditionNotMet,
    /// Any other result byte
    Other(u8),
}

impl ActuatorOutcome {
    pub fn from_result(result: u8) -> Self {
        match result {
            RESULT_OK => ActuatorOutcome::Completed,
            RESULT_PRECONDITION_FAILED => ActuatorOutcome::PreconditionNotMet,
            other => ActuatorOutcome::Other(other),
        }
    }
}
