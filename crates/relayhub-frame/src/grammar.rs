//! Character classes and converters for the text fields of a frame.
//!
//! Every field shares the same three operations:
//! - [`Field::scan`] counts the leading bytes that belong to the field's class
//! - [`Field::verify`] checks that a whole buffer is exactly one field
//! - [`Field::parse`] validates and constructs the typed value

use std::fmt;
use std::str::FromStr;

use crate::error::{FrameError, Result};

/// The byte that terminates Verb, Channel and Count on the wire.
pub const SEPARATOR: u8 = b' ';

/// Identifies a wire field in errors and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Verb,
    Channel,
    Count,
    Content,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Verb => "verb",
            FieldKind::Channel => "channel",
            FieldKind::Count => "count",
            FieldKind::Content => "content",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text field of the wire grammar.
pub trait Field: Sized {
    const KIND: FieldKind;

    /// Greedy count of bytes in the field's class starting at `start`.
    ///
    /// Returns 0 when the byte at `start` does not belong to the field.
    fn scan(buf: &[u8], start: usize) -> usize;

    /// Like [`Field::scan`], but for bytes that continue a field whose
    /// beginning arrived in an earlier chunk.
    fn scan_continuation(buf: &[u8], start: usize) -> usize {
        Self::scan(buf, start)
    }

    /// Whether `buf` consists of exactly one field and nothing else.
    fn verify(buf: &[u8]) -> bool {
        Self::scan(buf, 0) == buf.len()
    }

    /// Validate `buf` and construct the field.
    fn parse(buf: &[u8]) -> Result<Self>;

    /// Like [`Field::parse`], discarding the error.
    fn try_parse(buf: &[u8]) -> Option<Self> {
        Self::parse(buf).ok()
    }
}

pub(crate) fn scan_class(buf: &[u8], start: usize, class: impl Fn(u8) -> bool) -> usize {
    buf.get(start..)
        .map(|rest| rest.iter().take_while(|b| class(**b)).count())
        .unwrap_or(0)
}

fn is_verb_byte(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

/// Short command tag of a message: `[A-Za-z_]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Verb(String);

impl Verb {
    /// Validate and wrap a verb.
    pub fn new(verb: impl Into<String>) -> Result<Self> {
        let verb = verb.into();
        if verb.is_empty() || !Self::verify(verb.as_bytes()) {
            return Err(FrameError::InvalidField {
                field: FieldKind::Verb,
            });
        }
        Ok(Self(verb))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Field for Verb {
    const KIND: FieldKind = FieldKind::Verb;

    fn scan(buf: &[u8], start: usize) -> usize {
        scan_class(buf, start, is_verb_byte)
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        // The class is pure ASCII, so a verified verb is valid UTF-8.
        let text = std::str::from_utf8(buf).map_err(|_| FrameError::InvalidField {
            field: FieldKind::Verb,
        })?;
        Self::new(text)
    }
}

impl FromStr for Verb {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Verb {
    type Error = FrameError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire-only byte length prefix of the content: `[0-9]+`.
///
/// Values beyond `u64::MAX` saturate, so any configured content limit still
/// rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Count(u64);

impl Count {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl Field for Count {
    const KIND: FieldKind = FieldKind::Count;

    fn scan(buf: &[u8], start: usize) -> usize {
        scan_class(buf, start, |b| b.is_ascii_digit())
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() || !Self::verify(buf) {
            return Err(FrameError::InvalidField {
                field: FieldKind::Count,
            });
        }
        let value = buf.iter().fold(0u64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
        });
        Ok(Self(value))
    }
}

impl From<u64> for Count {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
