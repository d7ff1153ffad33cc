//! Mock transport for testing
//!
//! Plays the ECU side of the line from a script: every byte sent is looked
//! up in a reply table, and the matching reply is made readable either
//! immediately or after a delay. All timing uses the tokio clock, so tests
//! can run with a paused clock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{Transport, TransportError};

/// Scripted reply to one request byte
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockReply {
    /// Readable as soon as the request is sent
    pub immediate: Vec<u8>,
    /// Readable after the given delay
    pub delayed: Option<(Duration, Vec<u8>)>,
}

impl MockReply {
    /// Sensor reply: echo followed by the data byte
    pub fn sensor(address: u8, value: u8) -> Self {
        Self::bytes(vec![address, value])
    }

    /// Command reply: echo now, result byte after `delay`
    pub fn command(command: u8, delay: Duration, result: u8) -> Self {
        Self {
            immediate: vec![command],
            delayed: Some((delay, vec![result])),
        }
    }

    /// Arbitrary immediate bytes
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self {
            immediate: bytes,
            delayed: None,
        }
    }
}

#[derive(Default)]
struct MockState {
    replies: HashMap<u8, MockReply>,
    rx: VecDeque<u8>,
    pending: VecDeque<(Instant, Vec<u8>)>,
    sent: Vec<u8>,
    send_count: usize,
    receive_count: usize,
    flush_count: usize,
    unresponsive: bool,
}

impl MockState {
    fn deliver_due(&mut self, now: Instant) {
        while let Some((ready, _)) = self.pending.front() {
            if *ready > now {
                break;
            }
            if let Some((_, bytes)) = self.pending.pop_front() {
                self.rx.extend(bytes);
            }
        }
    }
}

/// Scripted ECU on the other end of a fake serial line
pub struct MockTransport {
    name: String,
    read_timeout: Duration,
    open: bool,
    state: Arc<Mutex<MockState>>,
}

/// Inspection and scripting handle that stays valid after the transport
/// has been moved into a protocol engine
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            read_timeout: Duration::from_millis(500),
            open: true,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Mock that answers every given `(address, value)` sensor query
    pub fn with_sensors(values: &[(u8, u8)]) -> Self {
        let mock = Self::new();
        let handle = mock.handle();
        for &(address, value) in values {
            handle.set_reply(address, MockReply::sensor(address, value));
        }
        mock
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Set the reply for a request byte, replacing any previous one
    pub fn set_reply(&self, request: u8, reply: MockReply) {
        self.state.lock().replies.insert(request, reply);
    }

    pub fn remove_reply(&self, request: u8) {
        self.state.lock().replies.remove(&request);
    }

    /// Make bytes readable right now, as if the ECU sent them unasked
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes.iter().copied());
    }

    /// Stop answering anything (cable pulled, ignition off)
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.state.lock().unresponsive = unresponsive;
    }

    /// Every byte sent so far, in order
    pub fn sent(&self) -> Vec<u8> {
        self.state.lock().sent.clone()
    }

    pub fn send_count(&self) -> usize {
        self.state.lock().send_count
    }

    pub fn receive_count(&self) -> usize {
        self.state.lock().receive_count
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flush_count
    }

    /// Bytes readable but not yet read
    pub fn unread(&self) -> usize {
        self.state.lock().rx.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let now = Instant::now();
        let mut state = self.state.lock();
        state.send_count += 1;
        state.sent.extend_from_slice(data);
        if state.unresponsive {
            return Ok(());
        }
        for byte in data {
            let Some(reply) = state.replies.get(byte).cloned() else {
                continue;
            };
            state.rx.extend(reply.immediate);
            if let Some((delay, bytes)) = reply.delayed {
                state.pending.push_back((now + delay, bytes));
            }
        }
        tracing::debug!(?data, "Mock transport: sent");
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let deadline = Instant::now() + self.read_timeout;
        self.state.lock().receive_count += 1;

        loop {
            let next_ready = {
                let mut state = self.state.lock();
                state.deliver_due(Instant::now());
                if !state.rx.is_empty() {
                    let n = buf.len().min(state.rx.len());
                    for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
                state.pending.front().map(|(ready, _)| *ready)
            };

            if Instant::now() >= deadline {
                return Ok(0);
            }
            let wake = next_ready.map_or(deadline, |ready| ready.min(deadline));
            tokio::time::sleep_until(wake).await;
        }
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let mut state = self.state.lock();
        state.flush_count += 1;
        state.rx.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
