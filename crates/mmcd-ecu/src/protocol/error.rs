//! Protocol engine errors

use std::time::Duration;

use mmcd_core::SourceError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Query address falls in the command range
    #[error("Address 0x{0:02X} is in the command range and cannot be queried")]
    AddressInCommandRange(u8),

    #[error("Command 0x{0:02X} is not whitelisted")]
    CommandNotAllowed(u8),

    /// Fewer than two reply bytes arrived in time
    #[error("Timeout querying 0x{address:02X}: received {received} of 2 bytes")]
    Timeout { address: u8, received: usize },

    #[error("Echo mismatch: sent 0x{expected:02X}, got 0x{got:02X}")]
    EchoMismatch { expected: u8, got: u8 },

    #[error("Timeout waiting for echo of command 0x{0:02X}")]
    CommandEchoTimeout(u8),

    #[error("Timeout waiting for result of command 0x{command:02X} after {timeout:?}")]
    CommandTimeout { command: u8, timeout: Duration },

    #[error("Command 0x{command:02X} returned 0x{result:02X}")]
    UnexpectedResult { command: u8, result: u8 },

    /// Every query of a poll cycle failed
    #[error("No response from ECU: {attempted} queries failed")]
    NoResponse { attempted: usize },

    /// No requested slot is active, wire-sourced and addressable
    #[error("No queryable sensor selected")]
    NothingToPoll,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    /// Whether the error was a missed deadline rather than a bad reply
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout { .. }
                | ProtocolError::CommandEchoTimeout(_)
                | ProtocolError::CommandTimeout { .. }
        )
    }
}

impl From<ProtocolError> for SourceError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Transport(e) => SourceError::Transport(e.to_string()),
            ProtocolError::NoResponse { attempted } => SourceError::NoResponse { attempted },
            ProtocolError::NothingToPoll => SourceError::NothingToPoll,
            e if e.is_timeout() => SourceError::Timeout(e.to_string()),
            e => SourceError::Protocol(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_mapping() {
        let timeout: SourceError = ProtocolError::Timeout {
            address: 0x21,
            received: 1,
        }
        .into();
        assert!(matches!(timeout, SourceError::Timeout(_)));

        let mismatch: SourceError = ProtocolError::EchoMismatch {
            expected: 0x21,
            got: 0x22,
        }
        .into();
        assert!(matches!(mismatch, SourceError::Protocol(_)));

        let dead: SourceError = ProtocolError::NoResponse { attempted: 8 }.into();
        assert_eq!(dead, SourceError::NoResponse { attempted: 8 });

        let nothing: SourceError = ProtocolError::NothingToPoll.into();
        assert_eq!(nothing, SourceError::NothingToPoll);

        let io: SourceError = ProtocolError::from(TransportError::NotOpen).into();
        assert!(io.is_link_failure());
    }

    #[test]
    fn test_display() {
        let err = ProtocolError::Timeout {
            address: 0x07,
            received: 0,
        };
        assert_eq!(err.to_string(), "Timeout querying 0x07: received 0 of 2 bytes");
        assert_eq!(
            ProtocolError::AddressInCommandRange(0xC0).to_string(),
            "Address 0xC0 is in the command range and cannot be queried"
        );
    }
}
