//! Sampling engine
//!
//! Drives poll cycles over any [`SamplePoller`](mmcd_core::SamplePoller)
//! on a background task and fans the results out to subscribers.

mod engine;
mod stats;

pub use engine::{
    DisconnectCallback, EngineStatus, ErrorCallback, SampleCallback, SamplingEngine,
};
pub use stats::EngineStats;
