use relayhub_frame::FrameError;
use relayhub_transport::TransportError;

/// Errors that can occur in hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Content could not be buffered for a multi-recipient send.
    #[error("content I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The service is stopped; listen and send are rejected.
    #[error("hub is not running")]
    NotRunning,

    /// A connection exceeded its receive byte-rate ceiling.
    #[error("receive rate limit exceeded ({received} bytes in the last second, limit {limit})")]
    RateLimited { received: u64, limit: u64 },
}

pub type Result<T> = std::result::Result<T, HubError>;
