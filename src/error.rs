//! Error types for the STUN codec and the discovery engine.

use std::io;
use thiserror::Error;

/// Result type used across the crate.
pub type StunResult<T> = Result<T, StunError>;

/// Errors produced by the codec and the probe transport.
///
/// Codec errors propagate up to the discovery engine, which drops
/// undecodable datagrams and keeps waiting; `Io` errors abort the
/// discovery run.
#[derive(Error, Debug)]
pub enum StunError {
    /// Textual IP address or transport address out of shape or range.
    #[error("malformed transport address: {0}")]
    MalformedAddress(String),

    /// Attribute value fails its kind-specific validation.
    #[error("malformed attribute: {0}")]
    MalformedAttribute(String),

    /// Truncated header, truncated attribute, or length overflow.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Attribute value exceeds the 16-bit length field.
    #[error("attribute value too long: {0} bytes")]
    AttributeTooLong(usize),

    /// Construction violates the active RFC mode.
    #[error("RFC compliance violation: {0}")]
    RfcViolation(String),

    /// Socket send or receive failure that is not a timeout.
    #[error("network error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_single_line() {
        let err = StunError::MalformedPacket("only 3 bytes".to_string());
        assert_eq!(err.to_string(), "malformed packet: only 3 bytes");

        let err = StunError::AttributeTooLong(70000);
        assert!(!err.to_string().contains('\n'));
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: StunError = io_err.into();
        assert!(matches!(err, StunError::Io(_)));
    }
}
