use relayhub_transport::TransportError;

use crate::grammar::FieldKind;

/// Errors that can occur during frame encoding/decoding.
///
/// Every variant is terminal for the stream it occurred on: there is no
/// resynchronization after a bad frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A field contains bytes outside its character class, or is empty.
    #[error("invalid {field} field")]
    InvalidField { field: FieldKind },

    /// A field was not followed by the single space separator.
    #[error("missing separator after {field} field (found byte 0x{found:02x})")]
    MissingSeparator { field: FieldKind, found: u8 },

    /// A field exceeds its configured maximum length.
    #[error("{field} field too large (max {max} bytes)")]
    FieldTooLarge { field: FieldKind, max: usize },

    /// The announced content exceeds the configured maximum.
    #[error("content too large ({size} bytes, max {max})")]
    ContentTooLarge { size: u64, max: u64 },

    /// The transport reached end of input before a frame started.
    #[error("connection closed")]
    ConnectionClosed,

    /// The transport reached end of input in the middle of a frame.
    #[error("connection closed mid-frame (while reading {field})")]
    BrokenFrame { field: FieldKind },

    /// The transport stopped accepting bytes in the middle of a frame.
    #[error("sink closed mid-frame")]
    SinkClosed,

    /// A previous operation in this direction failed or was cancelled.
    #[error("{direction} side of the stream is unusable after an earlier failure")]
    Poisoned { direction: &'static str },

    /// An I/O error occurred while buffering or spooling content.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl FrameError {
    /// Whether this error is a configured size limit being exceeded.
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self,
            FrameError::FieldTooLarge { .. } | FrameError::ContentTooLarge { .. }
        )
    }

    /// Whether the peer simply went away between frames.
    pub fn is_clean_close(&self) -> bool {
        matches!(
            self,
            FrameError::ConnectionClosed | FrameError::Transport(TransportError::Shutdown)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
