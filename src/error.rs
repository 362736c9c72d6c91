//! Custom error types for the crate.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of failures that can occur between opening a byte source and
//! handing decoded records to a consumer.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidFormat`**: a frame format descriptor was rejected at construction time
//!   (field rules that do not cover the payload, empty sync marker, ...). These are
//!   never raised once bytes are flowing.
//! - **`Config` / `Configuration`**: loading failures from `figment` and semantic
//!   validation failures of an otherwise well-formed configuration.
//! - **`SourceFailed`**: the byte source reported an I/O failure mid-session. This is
//!   distinct from a clean end-of-stream, which is not an error at all.
//! - **`SerialPort` / `SerialFeatureDisabled`**: opening the serial device failed, or the
//!   crate was built without serial support.
//!
//! End-of-stream is reported as `Ok(None)` by the decoder, never through this enum.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors raised by the frame decoding and acquisition pipeline.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Frame format descriptor rejected at construction.
    #[error("Invalid frame format: {0}")]
    InvalidFormat(String),

    /// Configuration file or environment could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Plain I/O failure outside of a running session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source failed while a session was running.
    #[error("Byte source '{source_name}' failed: {message}")]
    SourceFailed {
        /// Human-readable name of the source (port path, file path, ...)
        source_name: String,
        /// Underlying failure description
        message: String,
    },

    /// Opening the serial device failed.
    #[error("Serial port error: {0}")]
    SerialPort(String),

    /// Serial support was compiled out.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    /// The producer thread panicked instead of returning.
    #[error("Producer thread panicked")]
    ProducerPanicked,

    /// Writing an export file failed.
    #[error("Export error: {0}")]
    Export(String),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl DaqError {
    /// Whether this error means the device went away, as opposed to a misconfiguration.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, DaqError::SourceFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_failure_is_a_disconnect() {
        let err = DaqError::SourceFailed {
            source_name: "/dev/ttyUSB0".into(),
            message: "device reports readiness to read but returned no data".into(),
        };
        assert!(err.is_disconnect());
        assert!(err.to_string().contains("/dev/ttyUSB0"));
    }

    #[test]
    fn format_errors_are_not_disconnects() {
        let err = DaqError::InvalidFormat("empty sync marker".into());
        assert!(!err.is_disconnect());
        assert_eq!(err.to_string(), "Invalid frame format: empty sync marker");
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> AppResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        match fails() {
            Err(DaqError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
