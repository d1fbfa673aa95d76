use thiserror::Error;

/// Probe error types covering configuration, device, and host failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CmdqError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The radio driver rejected a call or could not be opened.
    #[error("device error: {0}")]
    Device(String),

    /// A channel index beyond what the device provides.
    #[error("invalid channel {channel} (device has {available})")]
    InvalidChannel {
        /// Requested channel.
        channel: usize,
        /// Number of channels the device exposes.
        available: usize,
    },

    /// Malformed device address arguments.
    #[error("invalid device args: {0}")]
    InvalidArgs(String),

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Real-time scheduling setup failed.
    #[error("real-time setup failed: {0}")]
    Realtime(String),

    /// Feature not compiled into this build.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<std::io::Error> for CmdqError {
    fn from(err: std::io::Error) -> Self {
        CmdqError::Io(err.to_string())
    }
}

/// Convenience type alias for probe operations.
pub type CmdqResult<T> = Result<T, CmdqError>;
