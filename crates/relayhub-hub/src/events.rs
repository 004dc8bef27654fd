use std::fmt;

use relayhub_frame::{Channel, Verb};
use relayhub_transport::TransportKind;

use crate::identity::Identity;

/// Connection lifecycle and traffic notifications.
///
/// Events for one connection are published in the order they happen.
/// Subscribers that fall behind lose the oldest events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// A transport joined the live set.
    Connected {
        identity: Identity,
        kind: TransportKind,
    },
    /// A message was read and queued for dispatch.
    Received {
        identity: Identity,
        verb: Verb,
        channel: Channel,
        len: u64,
    },
    /// A connection left the live set.
    Disconnected {
        identity: Identity,
        reason: DisconnectReason,
    },
}

impl HubEvent {
    pub fn identity(&self) -> Identity {
        match self {
            HubEvent::Connected { identity, .. }
            | HubEvent::Received { identity, .. }
            | HubEvent::Disconnected { identity, .. } => *identity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the connection between frames.
    Closed,
    /// A read failed: bad grammar, a size limit, or a broken transport.
    Failed,
    /// The receive rate limit was exceeded.
    RateLimited,
    /// The service stopped or shut down.
    Stopped,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::Closed => "closed",
            DisconnectReason::Failed => "failed",
            DisconnectReason::RateLimited => "rate_limited",
            DisconnectReason::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
