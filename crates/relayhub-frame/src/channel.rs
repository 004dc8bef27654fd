//! The channel field: an identity-relative address.
//!
//! Two values are reserved:
//! - [`LOOPBACK`] (`0`) delivers back to the sender
//! - [`BROADCAST`] (`-1`) delivers to every other connection
//!
//! Every other value is only meaningful relative to the sending connection.

use std::fmt;
use std::str::FromStr;

use crate::error::{FrameError, Result};
use crate::grammar::{scan_class, Field, FieldKind};

/// Loopback address.
pub const LOOPBACK: Channel = Channel(0);

/// Broadcast address.
pub const BROADCAST: Channel = Channel(-1);

/// Signed address of a message, written as optional sign + hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(i64);

impl Channel {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub fn is_loopback(self) -> bool {
        self == LOOPBACK
    }

    pub fn is_broadcast(self) -> bool {
        self == BROADCAST
    }

    /// Number of hex digits in a channel field, excluding any sign.
    pub fn digit_count(field: &[u8]) -> usize {
        match field.first() {
            Some(b'+' | b'-') => field.len() - 1,
            _ => field.len(),
        }
    }
}

fn is_sign(b: u8) -> bool {
    b == b'+' || b == b'-'
}

impl Field for Channel {
    const KIND: FieldKind = FieldKind::Channel;

    fn scan(buf: &[u8], start: usize) -> usize {
        match buf.get(start) {
            Some(&b) if is_sign(b) => 1 + Self::scan_continuation(buf, start + 1),
            _ => Self::scan_continuation(buf, start),
        }
    }

    fn scan_continuation(buf: &[u8], start: usize) -> usize {
        scan_class(buf, start, |b| b.is_ascii_hexdigit())
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        let invalid = || FrameError::InvalidField {
            field: FieldKind::Channel,
        };
        if !Self::verify(buf) {
            return Err(invalid());
        }

        let (negative, digits) = match buf.split_first() {
            Some((b'-', rest)) => (true, rest),
            Some((b'+', rest)) => (false, rest),
            _ => (false, buf),
        };
        if digits.is_empty() {
            return Err(invalid());
        }

        // Verified hex digits are ASCII.
        let text = std::str::from_utf8(digits).map_err(|_| invalid())?;
        let magnitude = u64::from_str_radix(text, 16).map_err(|_| invalid())?;

        let value = if negative {
            0i64.checked_sub_unsigned(magnitude).ok_or_else(invalid)?
        } else {
            i64::try_from(magnitude).map_err(|_| invalid())?
        };
        Ok(Self(value))
    }
}

impl From<i64> for Channel {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Channel> for i64 {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl FromStr for Channel {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s.as_bytes())
    }
}

/// Renders the wire form: `-` for negatives, then lowercase hex.
impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-{:x}", self.0.unsigned_abs())
        } else {
            write!(f, "{:x}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_values() {
        assert!(LOOPBACK.is_loopback());
        assert!(BROADCAST.is_broadcast());
        assert_eq!(LOOPBACK.to_string(), "0");
        assert_eq!(BROADCAST.to_string(), "-1");
    }

    #[test]
    fn scan_accepts_leading_sign_only() {
        assert_eq!(Channel::scan(b"-1 ", 0), 2);
        assert_eq!(Channel::scan(b"+Ff0 x", 0), 4);
        assert_eq!(Channel::scan(b"1-1", 0), 1);
        assert_eq!(Channel::scan(b"- ", 0), 1);
        assert_eq!(Channel::scan(b"g", 0), 0);
        assert_eq!(Channel::scan_continuation(b"-1", 0), 0);
    }

    #[test]
    fn parse_signed_hex() {
        assert_eq!(Channel::parse(b"0").unwrap().value(), 0);
        assert_eq!(Channel::parse(b"-1").unwrap().value(), -1);
        assert_eq!(Channel::parse(b"+10").unwrap().value(), 16);
        assert_eq!(Channel::parse(b"DeadBeef").unwrap().value(), 0xdead_beef);
        assert_eq!(
            Channel::parse(b"-8000000000000000").unwrap().value(),
            i64::MIN
        );
        assert_eq!(
            Channel::parse(b"0000000000000000000000000000002a")
                .unwrap()
                .value(),
            42
        );
    }

    #[test]
    fn parse_rejects_malformed_or_out_of_range() {
        assert!(Channel::parse(b"").is_err());
        assert!(Channel::parse(b"-").is_err());
        assert!(Channel::parse(b"+").is_err());
        assert!(Channel::parse(b"1-").is_err());
        assert!(Channel::parse(b"xyz").is_err());
        assert!(Channel::parse(b"8000000000000000").is_err());
        assert!(Channel::parse(b"-8000000000000001").is_err());
    }

    #[test]
    fn display_is_lowercase_signed_hex() {
        assert_eq!(Channel::new(255).to_string(), "ff");
        assert_eq!(Channel::new(-255).to_string(), "-ff");
        assert_eq!(Channel::new(i64::MIN).to_string(), "-8000000000000000");
        assert_eq!(Channel::new(i64::MAX).to_string(), "7fffffffffffffff");
    }

    #[test]
    fn text_form_round_trips() {
        for value in [0, -1, 1, 42, -42, i64::MIN, i64::MAX, 0x1234_5678_9abc] {
            let channel = Channel::new(value);
            let text = channel.to_string();
            assert!(Channel::verify(text.as_bytes()));
            assert_eq!(text.parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn digit_count_ignores_sign() {
        assert_eq!(Channel::digit_count(b"-abc"), 3);
        assert_eq!(Channel::digit_count(b"abc"), 3);
        assert_eq!(Channel::digit_count(b""), 0);
    }
}
