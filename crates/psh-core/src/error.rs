use thiserror::Error;

/// Errors produced by the psh protocol layer.
#[derive(Debug, Error)]
pub enum PshError {
    /// The transport could not be brought up. `message` is already classified.
    #[error("{message}")]
    Connect { target: String, message: String },

    /// The transport died while an operation was in flight.
    #[error("{0}")]
    Transport(String),

    /// A command ran on the remote host and failed.
    #[error("{message}")]
    RemoteCommand { code: i32, message: String },

    /// The response stream did not have the expected shape.
    #[error("protocol desync: {0}")]
    Desync(String),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid glob: {0}")]
    InvalidGlob(String),

    #[error("channel is closed")]
    ChannelClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl PshError {
    /// Whether this error means the session can no longer be used.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PshError::Connect { .. } | PshError::Transport(_) | PshError::ChannelClosed
        )
    }
}

pub type PshResult<T> = Result<T, PshError>;
