//! Error handling for the edge portal crate.

/// A specialized `Result` type for edge portal operations.
pub type Result<T> = std::result::Result<T, PeripheralError>;

/// The main error type for sensor, camera and web server operations.
#[derive(Debug, thiserror::Error)]
pub enum PeripheralError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I2C open, address selection, write or read failed
    #[error("{0}")]
    Device(String),

    /// Sensor response failed its CRC-8 check
    #[error("CRC mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The external frame producer could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot producer exited without a usable image
    #[error("snapshot produced no data")]
    EmptySnapshot,

    /// The snapshot producer did not finish in time
    #[error("snapshot timed out after {0} ms")]
    SnapshotTimeout(u64),

    /// The streaming client went away
    #[error("client disconnected")]
    ClientGone,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl PeripheralError {
    /// Create a new device error
    pub fn device_error(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a new spawn error for `program`
    pub fn spawn_error(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Whether this error ends a stream without being worth reporting.
    pub fn is_stream_fault(&self) -> bool {
        matches!(self, Self::ClientGone | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_message() {
        let err = PeripheralError::ChecksumMismatch {
            expected: 0x92,
            actual: 0x12,
        };
        assert_eq!(err.to_string(), "CRC mismatch (expected 0x92, got 0x12)");
    }

    #[test]
    fn test_stream_faults() {
        assert!(PeripheralError::ClientGone.is_stream_fault());
        assert!(!PeripheralError::EmptySnapshot.is_stream_fault());
    }
}
