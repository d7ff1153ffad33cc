//! mmcd-ecu - ECU communication for the MMCD datalogger
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Session                              │
//! │                                                             │
//! │  ┌──────────────────────┐     ┌──────────────────────────┐  │
//! │  │   SamplingEngine     │────▶│  dyn SamplePoller        │  │
//! │  │ (timer, watchdog,    │     │  Ecu  |  Simulator       │  │
//! │  │  subscribers)        │     └────────────┬─────────────┘  │
//! │  └──────────────────────┘                  │                │
//! │                                   ┌────────┴────────┐       │
//! │                                   │ Ecu (bus lock)  │       │
//! │                                   └────────┬────────┘       │
//! │                                   ┌────────┴────────┐       │
//! │                                   │ dyn Transport   │       │
//! │                                   │ (serial / mock) │       │
//! │                                   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod protocol;
pub mod sampling;
pub mod session;
pub mod simulator;
pub mod transport;

pub use config::{ConnectionConfig, EcuConfig, SamplingConfig};
pub use protocol::{Actuator, ActuatorOutcome, Ecu, ProtocolError};
pub use sampling::{EngineStats, EngineStatus, SamplingEngine};
pub use session::{Session, SessionError};
pub use simulator::Simulator;
pub use transport::{MockTransport, SerialTransport, Transport, TransportError};

// Re-export for convenience
pub use mmcd_core::{
    DtcReport, Sample, SamplePoller, SensorTable, SourceError, SourceResult, UnitSystem,
};
