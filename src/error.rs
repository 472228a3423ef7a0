//! Error types for servlink.

use thiserror::Error;

/// Main error type for all servlink operations.
#[derive(Debug, Error)]
pub enum ServlinkError {
    /// I/O error while writing to the channel or setting it up.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required startup input is missing or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed, truncated or out-of-sequence wire data, or a control
    /// outcome whose kind does not match the call being handled.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An inbound call arrived for a pattern with no registered handler.
    #[error("Handler not found for pattern: {0}")]
    HandlerNotFound(String),

    /// The runtime closed the channel before the handshake completed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failure raised by application handler code.
    #[error("Handler error: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl ServlinkError {
    /// Wrap an application error raised inside a handler.
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ServlinkError::Handler(err.into())
    }
}

/// Result type alias using ServlinkError.
pub type Result<T> = std::result::Result<T, ServlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_display() {
        let err = ServlinkError::handler("boom");
        assert_eq!(err.to_string(), "Handler error: boom");
    }

    #[test]
    fn test_io_error_converts() {
        fn read_missing() -> Result<Vec<u8>> {
            Ok(std::fs::read("/nonexistent/servlink/file")?)
        }

        let err = read_missing().unwrap_err();
        assert!(matches!(err, ServlinkError::Io(_)));
        assert!(err.to_string().starts_with("I/O error: "));
    }
}
