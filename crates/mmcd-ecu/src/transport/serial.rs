//! Serial port transport

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialStream, StopBits,
};
use tracing::{debug, info, warn};

use super::{Transport, TransportError};
use crate::config::{ConnectionConfig, DEFAULT_BAUD_RATE};

/// Transport over a real serial device, 8N1 without flow control
pub struct SerialTransport {
    port_name: String,
    read_timeout: Duration,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Open and configure the port
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &ConnectionConfig) -> Result<Self, TransportError> {
        if config.port.is_empty() {
            return Err(TransportError::InvalidConfig(
                "no serial port specified".to_string(),
            ));
        }
        if config.baud_rate != DEFAULT_BAUD_RATE {
            warn!(
                port = %config.port,
                baud_rate = config.baud_rate,
                expected = DEFAULT_BAUD_RATE,
                "Non-standard baud rate for the ECU diagnostic line"
            );
        }

        let builder = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout());

        let stream = SerialStream::open(&builder).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "failed to open serial port {}: {}",
                config.port, e
            ))
        })?;

        info!(port = %config.port, baud_rate = config.baud_rate, "Serial port opened");

        Ok(Self {
            port_name: config.port.clone(),
            read_timeout: config.read_timeout(),
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotOpen)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let read_timeout = self.read_timeout;
        let stream = self.stream()?;
        match tokio::time::timeout(read_timeout, stream.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Ok(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            Err(_) => Ok(0),
        }
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        let port_name = self.port_name.clone();
        let stream = self.stream()?;
        stream
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::FlushFailed(e.to_string()))?;
        debug!(port = %port_name, "Input buffer flushed");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.stream.take().is_some() {
            info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// Names of the serial devices present on this machine
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TransportError::ConnectionFailed(format!("failed to list ports: {e}")))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
