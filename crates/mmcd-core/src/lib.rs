//! mmcd-core - Core types and traits for the MMCD datalogger
//!
//! This crate defines the data model shared by every other layer:
//!
//! - [`Sample`]: one synchronized snapshot of up to 32 raw sensor slots
//! - [`SensorTable`]: the fixed slot/address/conversion table
//! - [`dtc`]: the 16-bit diagnostic trouble code decoder
//! - [`SamplePoller`]: the single-operation interface every sample source
//!   (live ECU or synthetic generator) implements
//!
//! Nothing here performs I/O.

pub mod dtc;
pub mod error;
pub mod poller;
pub mod sample;
pub mod sensor;

pub use dtc::{decode_dtcs, DtcCode, DtcReport, DTC_TABLE};
pub use error::{SourceError, SourceResult};
pub use poller::SamplePoller;
pub use sample::{Sample, MAX_SENSORS};
pub use sensor::{Conversion, SensorDefinition, SensorTable, UnitSystem};
