//! Protocol engine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mmcd_core::{DtcReport, Sample, SamplePoller, SensorTable, SourceResult};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::command::{
    is_command_allowed, Actuator, ActuatorOutcome, ERASE_DTC_COMMAND, RESULT_OK,
};
use super::ProtocolError;
use crate::transport::Transport;

/// Deadline for a sensor reply and for a command echo
pub const QUERY_TIMEOUT: Duration = Duration::from_millis(500);
/// Lowest address of the command range; never sent as a query
pub const COMMAND_ADDRESS_START: u8 = 0xC0;
/// Engine speed, answered whenever the key is on
pub const PROBE_ADDRESS: u8 = 0x21;

pub const DTC_ACTIVE_LOW: u8 = 0x38;
pub const DTC_ACTIVE_HIGH: u8 = 0x39;
pub const DTC_STORED_LOW: u8 = 0x3B;
pub const DTC_STORED_HIGH: u8 = 0x3C;

pub const ERASE_TIMEOUT: Duration = Duration::from_secs(1);
/// The ECU drives an actuator for about six seconds before answering
pub const ACTUATOR_TIMEOUT: Duration = Duration::from_secs(7);

type Bus = Box<dyn Transport>;

/// Marks the line as needing a flush if an exchange is abandoned midway
///
/// Dropping a query future while it waits for a reply leaves the reply
/// bytes in the driver buffer, where the next exchange would read them as
/// its own echo.
struct InFlight<'a> {
    interrupted: &'a AtomicBool,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn new(interrupted: &'a AtomicBool) -> Self {
        Self {
            interrupted,
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.interrupted.store(true, Ordering::SeqCst);
        }
    }
}

/// One ECU on one serial line
///
/// The transport sits behind the bus lock, so every request/reply exchange
/// runs to completion before the next one starts, whoever issues it.
pub struct Ecu {
    bus: Mutex<Bus>,
    table: Arc<SensorTable>,
    interrupted: AtomicBool,
    port_name: String,
}

impl Ecu {
    pub fn new(transport: Box<dyn Transport>, table: Arc<SensorTable>) -> Self {
        let port_name = transport.port_name().to_string();
        Self {
            bus: Mutex::new(transport),
            table,
            interrupted: AtomicBool::new(false),
            port_name,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn sensor_table(&self) -> &Arc<SensorTable> {
        &self.table
    }

    /// Take the bus lock, flushing first if the previous holder was cancelled
    async fn lock_bus(&self) -> MutexGuard<'_, Bus> {
        let mut bus = self.bus.lock().await;
        if self.interrupted.swap(false, Ordering::SeqCst) {
            debug!(port = %self.port_name, "Previous exchange was interrupted, flushing");
            recover(bus.as_mut()).await;
        }
        bus
    }

    /// Query one sensor address and return its data byte
    pub async fn query(&self, address: u8) -> Result<u8, ProtocolError> {
        if address >= COMMAND_ADDRESS_START {
            return Err(ProtocolError::AddressInCommandRange(address));
        }

        let mut bus = self.lock_bus().await;
        let in_flight = InFlight::new(&self.interrupted);
        let result = query_locked(bus.as_mut(), address).await;
        in_flight.finish();
        result
    }

    /// Send a whitelisted command and return the ECU's result byte
    ///
    /// `timeout` bounds the wait for the result after the echo arrived.
    pub async fn send_command(&self, command: u8, timeout: Duration) -> Result<u8, ProtocolError> {
        if !is_command_allowed(command) {
            return Err(ProtocolError::CommandNotAllowed(command));
        }

        let mut bus = self.lock_bus().await;
        let in_flight = InFlight::new(&self.interrupted);
        let result = command_locked(bus.as_mut(), command, timeout).await;
        in_flight.finish();
        result
    }

    /// Check the ECU is answering by querying engine speed
    pub async fn probe(&self) -> Result<u8, ProtocolError> {
        let value = {
            let mut bus = self.lock_bus().await;
            let in_flight = InFlight::new(&self.interrupted);
            let result = probe_locked(bus.as_mut()).await;
            in_flight.finish();
            result?
        };
        info!(
            port = %self.port_name,
            address = format_args!("0x{PROBE_ADDRESS:02X}"),
            data = format_args!("0x{value:02X}"),
            "ECU probe OK"
        );
        Ok(value)
    }

    /// Query the given slots in order and assemble a sample
    ///
    /// Inactive, computed and out-of-table slots are skipped. A failed
    /// query only drops its own slot; the cycle fails when every query
    /// failed, or with [`ProtocolError::NothingToPoll`] when no slot could
    /// be queried at all.
    pub async fn poll_sensors(&self, indices: &[usize]) -> Result<Sample, ProtocolError> {
        let mut sample = Sample::now();
        let mut attempted = 0;
        let mut failed = 0;

        for &idx in indices {
            let Some(address) = self.table.query_address(idx) else {
                continue;
            };
            attempted += 1;
            match self.query(address).await {
                Ok(value) => sample.set(idx, value),
                Err(e) => {
                    failed += 1;
                    let slug = self.table.get(idx).map_or("", |def| def.slug);
                    debug!(
                        slot = idx,
                        slug,
                        address = format_args!("0x{address:02X}"),
                        error = %e,
                        "Sensor query failed"
                    );
                }
            }
        }

        if attempted == 0 {
            return Err(ProtocolError::NothingToPoll);
        }
        if failed == attempted {
            return Err(ProtocolError::NoResponse { attempted });
        }

        sample.compute_derived(&self.table);
        Ok(sample)
    }

    /// Read the active and stored fault bitmaps
    pub async fn read_dtcs(&self) -> Result<DtcReport, ProtocolError> {
        let active_low = self.query(DTC_ACTIVE_LOW).await?;
        let active_high = self.query(DTC_ACTIVE_HIGH).await?;
        let stored_low = self.query(DTC_STORED_LOW).await?;
        let stored_high = self.query(DTC_STORED_HIGH).await?;

        let report = DtcReport::from_bitmaps(
            DtcReport::bitmap(active_low, active_high),
            DtcReport::bitmap(stored_low, stored_high),
        );
        debug!(
            active = format_args!("0x{:04X}", report.active_raw),
            stored = format_args!("0x{:04X}", report.stored_raw),
            "DTCs read"
        );
        Ok(report)
    }

    /// Erase all fault codes
    pub async fn erase_dtcs(&self) -> Result<(), ProtocolError> {
        let result = self.send_command(ERASE_DTC_COMMAND, ERASE_TIMEOUT).await?;
        if result != RESULT_OK {
            return Err(ProtocolError::UnexpectedResult {
                command: ERASE_DTC_COMMAND,
                result,
            });
        }
        info!(port = %self.port_name, "DTCs erased");
        Ok(())
    }

    /// Run one actuator test and wait for the ECU to report back
    pub async fn run_actuator(&self, actuator: Actuator) -> Result<ActuatorOutcome, ProtocolError> {
        info!(
            actuator = %actuator,
            command = format_args!("0x{:02X}", actuator.address()),
            "Running actuator test"
        );
        let result = self
            .send_command(actuator.address(), ACTUATOR_TIMEOUT)
            .await?;
        let outcome = ActuatorOutcome::from_result(result);
        if outcome == ActuatorOutcome::PreconditionNotMet {
            warn!(actuator = %actuator, "ECU refused actuator test, engine must be off");
        }
        Ok(outcome)
    }

    /// Close the transport, waiting for any exchange in progress
    pub async fn close(&self) -> Result<(), ProtocolError> {
        let mut bus = self.bus.lock().await;
        bus.close().await?;
        Ok(())
    }
}

#[async_trait]
impl SamplePoller for Ecu {
    async fn poll(&self, indices: &[usize]) -> SourceResult<Sample> {
        Ok(self.poll_sensors(indices).await?)
    }
}

async fn recover(transport: &mut dyn Transport) {
    if let Err(e) = transport.flush().await {
        warn!(port = %transport.port_name(), error = %e, "Flush after failed exchange failed");
    }
}

/// Read into `buf` until it is full or `timeout` passes
async fn read_within(
    transport: &mut dyn Transport,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<usize, ProtocolError> {
    let deadline = Instant::now() + timeout;
    let mut total = 0;
    while total < buf.len() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, transport.receive(&mut buf[total..])).await {
            Ok(Ok(n)) => total += n,
            Ok(Err(e)) => {
                recover(transport).await;
                return Err(e.into());
            }
            Err(_) => break,
        }
    }
    Ok(total)
}

async fn query_locked(transport: &mut dyn Transport, address: u8) -> Result<u8, ProtocolError> {
    transport.send(&[address]).await?;

    let mut reply = [0u8; 2];
    let received = read_within(transport, &mut reply, QUERY_TIMEOUT).await?;
    if received < reply.len() {
        recover(transport).await;
        return Err(ProtocolError::Timeout { address, received });
    }

    if reply[0] != address {
        warn!(
            expected = format_args!("0x{address:02X}"),
            got = format_args!("0x{:02X}", reply[0]),
            "ECU echo mismatch"
        );
        recover(transport).await;
        return Err(ProtocolError::EchoMismatch {
            expected: address,
            got: reply[0],
        });
    }

    Ok(reply[1])
}

async fn probe_locked(transport: &mut dyn Transport) -> Result<u8, ProtocolError> {
    transport.flush().await?;
    query_locked(transport, PROBE_ADDRESS).await
}

async fn command_locked(
    transport: &mut dyn Transport,
    command: u8,
    timeout: Duration,
) -> Result<u8, ProtocolError> {
    transport.flush().await?;
    transport.send(&[command]).await?;

    let mut echo = [0u8; 1];
    if read_within(transport, &mut echo, QUERY_TIMEOUT).await? < 1 {
        recover(transport).await;
        return Err(ProtocolError::CommandEchoTimeout(command));
    }
    if echo[0] != command {
        warn!(
            expected = format_args!("0x{command:02X}"),
            got = format_args!("0x{:02X}", echo[0]),
            "Command echo mismatch"
        );
        recover(transport).await;
        return Err(ProtocolError::EchoMismatch {
            expected: command,
            got: echo[0],
        });
    }

    let mut result = [0u8; 1];
    if read_within(transport, &mut result, timeout).await? < 1 {
        recover(transport).await;
        return Err(ProtocolError::CommandTimeout { command, timeout });
    }

    debug!(
        command = format_args!("0x{command:02X}"),
        result = format_args!("0x{:02X}", result[0]),
        "Command completed"
    );
    Ok(result[0])
}
