//! Transport trait

use async_trait::async_trait;

use super::TransportError;

/// Byte-level access to one half-duplex serial line
///
/// Callers must hold exclusive access (`&mut self`) for a whole exchange;
/// the protocol engine enforces this by keeping the transport behind its
/// bus lock.
#[async_trait]
pub trait Transport: Send {
    /// Write all bytes to the line
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read whatever is available, waiting at most the read deadline
    ///
    /// Returns the number of bytes read. This may be fewer than
    /// `buf.len()`, and is 0 when the deadline passes with nothing
    /// received. Callers loop until they have what they need.
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Discard unread input buffered by the driver
    ///
    /// Only used to recover after a failed exchange.
    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Close the line. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Name of the underlying device, for logs
    fn port_name(&self) -> &str;
}
