//! Command implementations for mmcd

pub mod dtc;
pub mod dump;
pub mod import;
pub mod log;
pub mod ports;
pub mod probe;
pub mod sensors;

pub use dtc::dtc;
pub use dump::dump;
pub use import::import;
pub use log::{log, LogOptions};
pub use ports::ports;
pub use probe::probe;
pub use sensors::sensors;
pub use test::test;
