//! Private connection identities and the XOR arithmetic that routes between
//! them.
//!
//! A connection never learns its own identity or anyone else's. It only sees
//! channel values, each of which is the XOR of two identities:
//!
//! ```text
//! sender S broadcasts         -> recipient R sees channel v = id(S) ^ id(R)
//! R replies on v              -> hub resolves id(R) ^ v == id(S)
//! ```

use std::fmt;

use relayhub_frame::Channel;

/// Random per-connection value, fixed for the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(i64);

impl Identity {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// A fresh random identity.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// Channel on which `other` sees messages sent by `self`.
    pub fn relative_to(self, other: Identity) -> Channel {
        Channel::new(self.0 ^ other.0)
    }

    /// Identity addressed when `self` sends on `channel`.
    pub fn resolve(self, channel: Channel) -> Identity {
        Identity(self.0 ^ channel.value())
    }

    /// Whether the two identities would relate through a reserved channel.
    ///
    /// Equal identities XOR to loopback (`0`), complementary ones to
    /// broadcast (`-1`).
    pub fn conflicts_with(self, other: Identity) -> bool {
        self.0 == other.0 || self.0 == !other.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0 as u64)
    }
}
