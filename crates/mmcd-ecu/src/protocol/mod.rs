//! MMCD wire protocol
//!
//! Single-byte requests on a half-duplex line:
//! - sensor query: send an address in `0x00..=0xBF`, the ECU answers with
//!   the echoed address and one data byte
//! - command: send a whitelisted address (`0xCA`, `0xF1..=0xFC`), the ECU
//!   echoes it, then answers with one result byte once the command is done

mod command;
mod ecu;
mod error;

pub use command::{
    is_command_allowed, Actuator, ActuatorOutcome, COMMAND_WHITELIST, ERASE_DTC_COMMAND,
    RESULT_OK, RESULT_PRECONDITION_FAILED,
};
pub use ecu::{
    Ecu, ACTUATOR_TIMEOUT, COMMAND_ADDRESS_START, DTC_ACTIVE_HIGH, DTC_ACTIVE_LOW,
    DTC_STORED_HIGH, DTC_STORED_LOW, ERASE_TIMEOUT, PROBE_ADDRESS, QUERY_TIMEOUT,
};
pub use error::ProtocolError;
