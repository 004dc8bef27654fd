use std::fmt;
use std::io;

use relayhub_frame::FrameError;
use relayhub_hub::HubError;
use relayhub_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. }
            if !matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied | io::ErrorKind::TimedOut
            ) =>
        {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {source}"))
        }
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Transport(source) => transport_error(context, source),
        FrameError::InvalidField { .. }
        | FrameError::MissingSeparator { .. }
        | FrameError::FieldTooLarge { .. }
        | FrameError::ContentTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::BrokenFrame { .. } | FrameError::SinkClosed => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn hub_error(context: &str, err: HubError) -> CliError {
    match err {
        HubError::Transport(err) => transport_error(context, err),
        HubError::Frame(err) => frame_error(context, err),
        HubError::Io(err) => io_error(context, err),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use relayhub_frame::FieldKind;

    use super::*;

    #[test]
    fn grammar_and_limit_errors_are_data_invalid() {
        let err = frame_error(
            "receive failed",
            FrameError::InvalidField {
                field: FieldKind::Verb,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
        assert_eq!(
            frame_error("x", FrameError::ContentTooLarge { size: 9, max: 1 }).code,
            DATA_INVALID
        );
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let err = transport_error(
            "connect failed",
            TransportError::Connect {
                target: "127.0.0.1:1".to_string(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("connect failed: "));
    }

    #[test]
    fn hub_errors_delegate_to_inner_kind() {
        assert_eq!(
            hub_error("x", HubError::Frame(FrameError::ConnectionClosed)).code,
            FAILURE
        );
        assert_eq!(
            hub_error("x", HubError::Io(io::Error::from(io::ErrorKind::TimedOut))).code,
            TIMEOUT
        );
        assert_eq!(hub_error("x", HubError::NotRunning).code, FAILURE);
    }
}
