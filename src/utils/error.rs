use std::io;
use thiserror::Error;

/// Main error type for the encoder library.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// The image has a zero width or height.
    #[error("Invalid dimension: {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },
    /// The sample buffer is too short for the declared geometry.
    #[error("Invalid buffer: expected at least {expected} samples, got {actual}")]
    InvalidBuffer { expected: usize, actual: usize },
    /// An invalid argument was provided
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Internal invariant violation in the transform or entropy stage
    #[error("Encode failure: {0}")]
    EncodeFailure(String),
    /// A scheduled unit of work failed or panicked
    #[error("Worker failed on unit {index}: {message}")]
    WorkerPanic {
        index: usize,
        message: String,
        #[source]
        source: Option<Box<EncodeError>>,
    },
    /// A batch stopped early because a concurrent batch of the same call failed
    #[error("Cancelled: {skipped} units skipped after a failure in another batch")]
    Cancelled { skipped: usize },
    /// The assembled output does not fit the container's size fields
    #[error("Mux overflow: {size} bytes exceeds the {limit} byte ceiling")]
    MuxOverflow { size: u64, limit: u64 },
    /// A container could not be parsed back
    #[error("Malformed container: {0}")]
    MalformedContainer(String),
    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for encoding operations.
pub type Result<T> = std::result::Result<T, EncodeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display() {
        assert_eq!(
            EncodeError::InvalidDimension { width: 0, height: 7 }.to_string(),
            "Invalid dimension: 0x7"
        );

        assert_eq!(
            EncodeError::InvalidArgument("test".to_string()).to_string(),
            "Invalid argument: test"
        );

        assert_eq!(
            EncodeError::MuxOverflow { size: 10, limit: 4 }.to_string(),
            "Mux overflow: 10 bytes exceeds the 4 byte ceiling"
        );

        assert_eq!(
            EncodeError::Cancelled { skipped: 12 }.to_string(),
            "Cancelled: 12 units skipped after a failure in another batch"
        );

        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        assert_eq!(
            EncodeError::Io(io_error).to_string(),
            "I/O error: file not found"
        );
    }

    #[test]
    fn test_worker_panic_keeps_source() {
        let err = EncodeError::WorkerPanic {
            index: 3,
            message: "bad block".to_string(),
            source: Some(Box::new(EncodeError::EncodeFailure("bad block".to_string()))),
        };
        let source = err.source().expect("source should be kept");
        assert_eq!(source.to_string(), "Encode failure: bad block");
    }
}
