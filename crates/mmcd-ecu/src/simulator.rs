//! Synthetic sample source
//!
//! Replays a 60 second driving cycle with noise so logging and display can
//! be exercised without a car:
//!
//! | time     | phase        |
//! |----------|--------------|
//! | 0-10 s   | idle         |
//! | 10-20 s  | acceleration |
//! | 20-40 s  | cruise       |
//! | 40-50 s  | deceleration |
//! | 50-60 s  | idle         |

use std::sync::Arc;

use async_trait::async_trait;
use mmcd_core::{Sample, SamplePoller, SensorTable, SourceError, SourceResult};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Simulated time advanced per poll (~20 Hz)
const TICK_SECONDS: f64 = 0.05;
const CYCLE_SECONDS: f64 = 60.0;

/// Targets for one point of the driving cycle
#[derive(Debug, Clone, Copy, PartialEq)]
struct Targets {
    rpm: f64,
    tps: f64,
    coolant: f64,
    timing: f64,
    pulse_ms: f64,
}

impl Targets {
    const IDLE: Targets = Targets {
        rpm: 850.0,
        tps: 0.0,
        coolant: 82.0,
        timing: 10.0,
        pulse_ms: 3.0,
    };

    const CRUISE: Targets = Targets {
        rpm: 3200.0,
        tps: 25.0,
        coolant: 90.0,
        timing: 32.0,
        pulse_ms: 8.0,
    };

    fn at(cycle_pos: f64) -> Self {
        if cycle_pos < 10.0 {
            Self::IDLE
        } else if cycle_pos < 20.0 {
            let p = (cycle_pos - 10.0) / 10.0;
            Targets {
                rpm: 850.0 + p * 5150.0,
                tps: 30.0 + p * 60.0,
                coolant: 82.0 + p * 8.0,
                timing: 10.0 + p * 25.0,
                pulse_ms: 3.0 + p * 15.0,
            }
        } else if cycle_pos < 40.0 {
            Self::CRUISE
        } else if cycle_pos < 50.0 {
            let p = (cycle_pos - 40.0) / 10.0;
            Targets {
                rpm: 3200.0 - p * 2350.0,
                tps: 25.0 - p * 25.0,
                coolant: 90.0 - p * 8.0,
                timing: 32.0 - p * 22.0,
                pulse_ms: 8.0 - p * 5.0,
            }
        } else {
            Self::IDLE
        }
    }
}

struct SimState {
    tick: f64,
    rng: StdRng,
}

impl SimState {
    fn noise(&mut self, base: f64, amplitude: f64) -> f64 {
        base + (self.rng.gen::<f64>() - 0.5) * 2.0 * amplitude
    }
}

/// Sample source producing a plausible driving cycle
pub struct Simulator {
    table: Arc<SensorTable>,
    state: Mutex<SimState>,
}

impl Simulator {
    pub fn new(table: Arc<SensorTable>) -> Self {
        Self::from_rng(table, StdRng::from_entropy())
    }

    /// Deterministic noise, for tests
    pub fn with_seed(table: Arc<SensorTable>, seed: u64) -> Self {
        Self::from_rng(table, StdRng::seed_from_u64(seed))
    }

    fn from_rng(table: Arc<SensorTable>, rng: StdRng) -> Self {
        Self {
            table,
            state: Mutex::new(SimState { tick: 0.0, rng }),
        }
    }

    /// Simulated seconds elapsed
    pub fn elapsed(&self) -> f64 {
        self.state.lock().tick
    }

    /// Generate the next sample
    pub fn next_sample(&self, indices: &[usize]) -> Sample {
        let mut state = self.state.lock();
        state.tick += TICK_SECONDS;
        let tick = state.tick;
        let t = Targets::at(tick % CYCLE_SECONDS);

        let mut sample = Sample::now();
        for &idx in indices {
            let Some(def) = self.table.get(idx) else {
                continue;
            };
            if !def.exists || def.computed {
                continue;
            }
            let raw = match def.slug {
                "RPM" => byte(state.noise(t.rpm, 30.0) / 31.25),
                "TPS" => byte(state.noise(t.tps, 1.0) * 255.0 / 100.0),
                // rough inverse of the coolant interpolation
                "COOL" => byte(state.noise(200.0 - t.coolant * 1.2, 2.0)),
                "TIMA" => byte(state.noise(t.timing + 10.0, 1.0)),
                "KNCK" => {
                    if t.rpm > 4000.0 && state.rng.gen::<f64>() < 0.15 {
                        state.rng.gen_range(1..=5)
                    } else {
                        0
                    }
                }
                "INJP" => byte(state.noise(t.pulse_ms / 0.256, 0.5)),
                "BATT" => byte(state.noise(14.2 / 0.0733, 0.5)),
                "O2-R" | "O2-F" => byte((0.45 + 0.35 * (tick * 3.0 + idx as f64).sin()) / 0.0195),
                "BARO" => byte(state.noise(1.01 / 0.00486, 0.3)),
                "ISC" => {
                    let pct = if t.rpm < 1000.0 {
                        state.noise(35.0, 2.0)
                    } else {
                        state.noise(10.0, 1.0)
                    };
                    byte(pct * 255.0 / 100.0)
                }
                "MAFS" => byte(state.noise(t.rpm * 0.08 / 6.29, 1.0)),
                "AIRT" => byte(state.noise(128.0, 2.0)),
                "EGRT" => byte(state.noise((314.27 - 150.0 + t.tps * 0.5) / 1.5, 2.0)),
                "FTRL" | "FTRM" | "FTRH" => byte(state.noise(128.0, 3.0)),
                "FTO2" => byte(state.noise(128.0, 5.0)),
                "ACLE" => {
                    if t.tps > 50.0 {
                        byte(state.noise(t.tps * 0.5 * 255.0 / 100.0, 3.0))
                    } else {
                        byte(state.noise(5.0, 2.0))
                    }
                }
                // AC off
                "FLG0" => 0x20,
                "FLG2" => {
                    if t.rpm < 1000.0 {
                        0x80
                    } else {
                        0x00
                    }
                }
                _ => byte(state.noise(128.0, 10.0)),
            };
            sample.set(idx, raw);
        }

        sample.compute_derived(&self.table);
        sample
    }
}

#[async_trait]
impl SamplePoller for Simulator {
    async fn poll(&self, indices: &[usize]) -> SourceResult<Sample> {
        if !indices.iter().any(|&idx| self.table.query_address(idx).is_some()) {
            return Err(SourceError::NothingToPoll);
        }
        Ok(self.next_sample(indices))
    }
}

fn byte(v: f64) -> u8 {
    v.clamp(0.0, 255.0) as u8
}
