//! Sampling statistics

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::EngineStatus;

/// Counters kept by the sampling loop, reset on every start
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub sample_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
}

/// Snapshot of the sampling engine's health
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub status: EngineStatus,
    /// Successful cycles since start
    pub sample_count: u64,
    /// Failed cycles since start
    pub error_count: u64,
    pub consecutive_errors: u32,
    /// Achieved sample rate since start
    pub current_hz: f64,
    #[serde(with = "duration_secs")]
    pub uptime: Duration,
}

impl EngineStats {
    pub(crate) fn new(
        status: EngineStatus,
        counters: Counters,
        started_at: Option<Instant>,
        stopped_at: Option<Instant>,
    ) -> Self {
        let uptime = match (started_at, stopped_at) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        let secs = uptime.as_secs_f64();
        let current_hz = if secs > 0.0 {
            counters.sample_count as f64 / secs
        } else {
            0.0
        };
        Self {
            status,
            sample_count: counters.sample_count,
            error_count: counters.error_count,
            consecutive_errors: counters.consecutive_errors,
            current_hz,
            uptime,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
