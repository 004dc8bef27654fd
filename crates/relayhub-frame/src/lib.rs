//! Text framing for relayhub connections.
//!
//! Every message on the wire is four fields separated by single spaces:
//! - a verb of ASCII letters and underscores
//! - a channel: optional sign plus hex digits, relative to the sender
//! - a decimal count of content bytes
//! - exactly `count` bytes of opaque content
//!
//! [`FrameReader`] parses this incrementally from any [`Transport`], no
//! matter how the bytes are chunked, and spools large content to a
//! temporary file. [`FrameWriter`] stages output through a fixed buffer.
//!
//! [`Transport`]: relayhub_transport::Transport

pub mod channel;
pub mod codec;
pub mod content;
pub mod error;
pub mod grammar;
pub mod message;
pub mod reader;
pub mod writer;

pub use channel::{Channel, BROADCAST, LOOPBACK};
pub use codec::{
    decode_message, encode_header, encode_message, FrameConfig, MessageCodec,
    DEFAULT_BUFFER_SIZE, DEFAULT_FAST_BUFFERING_THRESHOLD, DEFAULT_MAX_CHANNEL_LENGTH,
    DEFAULT_MAX_CONTENT, DEFAULT_MAX_COUNT_LENGTH, DEFAULT_MAX_VERB_LENGTH,
};
pub use content::Content;
pub use error::{FrameError, Result};
pub use grammar::{Count, Field, FieldKind, Verb, SEPARATOR};
pub use message::Message;
pub use reader::FrameReader;
pub use writer::{push_all, FrameWriter};
