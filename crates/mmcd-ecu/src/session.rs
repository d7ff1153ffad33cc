//! Connection session
//!
//! A [`Session`] owns one sample source and the sampling engine driving
//! it. It is created on connect and torn down on disconnect; nothing
//! about it is global, so several sessions can coexist.

use std::sync::Arc;

use mmcd_core::{SamplePoller, SensorTable};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{EcuConfig, SamplingConfig};
use crate::protocol::{Ecu, ProtocolError};
use crate::sampling::SamplingEngine;
use crate::simulator::Simulator;
use crate::transport::{SerialTransport, Transport, TransportError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to open serial port: {0}")]
    Connect(#[from] TransportError),

    #[error("ECU not responding: {0}")]
    Probe(#[source] ProtocolError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// One live or simulated connection
pub struct Session {
    ecu: Option<Arc<Ecu>>,
    engine: SamplingEngine,
    table: Arc<SensorTable>,
}

impl Session {
    /// Open the configured serial port and check the ECU answers
    pub async fn connect(config: &EcuConfig, table: Arc<SensorTable>) -> Result<Self, SessionError> {
        let transport = SerialTransport::open(&config.connection)?;
        Self::open(Box::new(transport), table, config).await
    }

    /// Start a session over an already opened transport
    pub async fn open(
        transport: Box<dyn Transport>,
        table: Arc<SensorTable>,
        config: &EcuConfig,
    ) -> Result<Self, SessionError> {
        let ecu = Arc::new(Ecu::new(transport, Arc::clone(&table)));

        if config.connection.probe_on_connect {
            if let Err(e) = ecu.probe().await {
                if let Err(close_err) = ecu.close().await {
                    warn!(error = %close_err, "Failed to close port after probe failure");
                }
                return Err(SessionError::Probe(e));
            }
        }

        let source: Arc<dyn SamplePoller> = ecu.clone();
        let engine = SamplingEngine::new(source, config.sampling.clone());
        info!(port = %ecu.port_name(), "ECU session opened");

        Ok(Self {
            ecu: Some(ecu),
            engine,
            table,
        })
    }

    /// Session backed by the synthetic source
    pub fn simulated(table: Arc<SensorTable>, sampling: SamplingConfig) -> Self {
        let source: Arc<dyn SamplePoller> = Arc::new(Simulator::new(Arc::clone(&table)));
        info!("Simulated session opened");
        Self {
            ecu: None,
            engine: SamplingEngine::new(source, sampling),
            table,
        }
    }

    /// The protocol engine, absent for simulated sessions
    pub fn ecu(&self) -> Option<&Arc<Ecu>> {
        self.ecu.as_ref()
    }

    pub fn engine(&self) -> &SamplingEngine {
        &self.engine
    }

    pub fn sensor_table(&self) -> &Arc<SensorTable> {
        &self.table
    }

    pub fn is_live(&self) -> bool {
        self.ecu.is_some()
    }

    /// Stop sampling and close the port
    pub async fn close(self) -> Result<(), SessionError> {
        self.engine.stop().await;
        if let Some(ecu) = &self.ecu {
            ecu.close().await?;
            info!(port = %ecu.port_name(), "ECU session closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PROBE_ADDRESS;
    use crate::transport::MockTransport;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_open_probes_ecu() {
        let mock = MockTransport::with_sensors(&[(PROBE_ADDRESS, 0x20)]);
        let handle = mock.handle();
        let session = Session::open(
            Box::new(mock),
            Arc::new(SensorTable::default()),
            &EcuConfig::default(),
        )
        .await
        .unwrap();

        assert!(session.is_live());
        assert_eq!(handle.sent(), vec![PROBE_ADDRESS]);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_closes_port() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let err = Session::open(
            Box::new(mock),
            Arc::new(SensorTable::default()),
            &EcuConfig::default(),
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(err, SessionError::Probe(_)));
        // probe flush + timeout recovery flush
        assert_eq!(handle.flush_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_can_be_skipped() {
        let mut config = EcuConfig::default();
        config.connection.probe_on_connect = false;
        let mock = MockTransport::new();
        let handle = mock.handle();
        let session = Session::open(Box::new(mock), Arc::new(SensorTable::default()), &config)
            .await
            .unwrap();
        assert_eq!(handle.send_count(), 0);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_session_samples() {
        let session = Session::simulated(Arc::new(SensorTable::default()), SamplingConfig::synthetic());
        assert!(!session.is_live());
        assert!(session.ecu().is_none());

        let table = Arc::clone(session.sensor_table());
        session.engine().set_indices(table.common_indices());
        session.engine().start();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let last = session.engine().last_sample().unwrap();
        // the common set plus the derived duty cycle
        assert_eq!(last.len(), 9);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_without_port_fails() {
        let err = Session::connect(&EcuConfig::default(), Arc::new(SensorTable::default()))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SessionError::Connect(TransportError::InvalidConfig(_))
        ));
    }
}
