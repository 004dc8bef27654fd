use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::channel::Channel;
use crate::content::Content;
use crate::error::{FrameError, Result};
use crate::grammar::{Count, Field, FieldKind, Verb, SEPARATOR};
use crate::message::Message;

/// Default maximum verb length in bytes.
pub const DEFAULT_MAX_VERB_LENGTH: usize = 128;

/// Default maximum number of hex digits in a channel.
pub const DEFAULT_MAX_CHANNEL_LENGTH: usize = 32;

/// Default maximum number of decimal digits in a count.
pub const DEFAULT_MAX_COUNT_LENGTH: usize = 32;

/// Default maximum content size: 4 MiB.
pub const DEFAULT_MAX_CONTENT: u64 = 4 * 1024 * 1024;

/// Default size at which content spills to a temporary file: 1 MiB.
pub const DEFAULT_FAST_BUFFERING_THRESHOLD: u64 = 1024 * 1024;

/// Default read and write buffer size: 1 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Configuration for frame parsing and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum verb length in bytes. Default: 128.
    pub max_verb_length: usize,
    /// Maximum hex digits in a channel, excluding the sign. Default: 32.
    pub max_channel_length: usize,
    /// Maximum decimal digits in a count. Default: 32.
    pub max_count_length: usize,
    /// Maximum content size in bytes. Default: 4 MiB.
    pub max_content_length: u64,
    /// Content below this size is buffered in memory, at or above it is
    /// spooled to a temporary file. Default: 1 MiB.
    pub fast_buffering_threshold: u64,
    /// Size of the fixed read buffer. Default: 1 KiB.
    pub read_buffer_size: usize,
    /// Size of the fixed write buffer. Default: 1 KiB.
    pub write_buffer_size: usize,
}

impl FrameConfig {
    /// Limit for a text field, including the channel's optional sign.
    pub fn field_limit(&self, field: FieldKind) -> usize {
        match field {
            FieldKind::Verb => self.max_verb_length,
            FieldKind::Channel => self.max_channel_length.saturating_add(1),
            FieldKind::Count => self.max_count_length,
            FieldKind::Content => usize::try_from(self.max_content_length).unwrap_or(usize::MAX),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_verb_length: DEFAULT_MAX_VERB_LENGTH,
            max_channel_length: DEFAULT_MAX_CHANNEL_LENGTH,
            max_count_length: DEFAULT_MAX_COUNT_LENGTH,
            max_content_length: DEFAULT_MAX_CONTENT,
            fast_buffering_threshold: DEFAULT_FAST_BUFFERING_THRESHOLD,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Encode a message with in-memory content into the wire format.
///
/// Wire format:
/// ```text
/// <verb> SP <channel> SP <count> SP <content: exactly count bytes>
///
/// MSG 0 2 hi
/// ```
pub fn encode_message(verb: &Verb, channel: Channel, payload: &[u8], dst: &mut BytesMut) {
    encode_header(verb, channel, payload.len() as u64, dst);
    dst.put_slice(payload);
}

/// Encode the three text fields and their separators, without content.
pub fn encode_header(verb: &Verb, channel: Channel, count: u64, dst: &mut BytesMut) {
    let channel = channel.to_string();
    let count = Count::new(count).to_string();
    dst.reserve(verb.len() + channel.len() + count.len() + 3);
    dst.put_slice(verb.as_bytes());
    dst.put_u8(SEPARATOR);
    dst.put_slice(channel.as_bytes());
    dst.put_u8(SEPARATOR);
    dst.put_slice(count.as_bytes());
    dst.put_u8(SEPARATOR);
}

/// Locate one separator-terminated field starting at `start`.
///
/// Returns the end of the field (exclusive, the separator's index), or
/// `None` when the buffer ends before the separator.
fn locate_field<F: Field>(src: &[u8], start: usize, config: &FrameConfig) -> Result<Option<usize>> {
    let limit = config.field_limit(F::KIND);
    let run = F::scan(src, start);
    if run > limit {
        return Err(FrameError::FieldTooLarge {
            field: F::KIND,
            max: limit,
        });
    }

    let end = start + run;
    match src.get(end) {
        None => Ok(None),
        Some(&SEPARATOR) => Ok(Some(end)),
        Some(&found) => Err(FrameError::MissingSeparator {
            field: F::KIND,
            found,
        }),
    }
}

/// Decode one message with in-memory content from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Message>> {
    let Some(verb_end) = locate_field::<Verb>(src, 0, config)? else {
        return Ok(None);
    };
    let channel_start = verb_end + 1;
    let Some(channel_end) = locate_field::<Channel>(src, channel_start, config)? else {
        return Ok(None);
    };
    let count_start = channel_end + 1;
    let Some(count_end) = locate_field::<Count>(src, count_start, config)? else {
        return Ok(None);
    };

    let verb = Verb::parse(&src[..verb_end])?;
    let channel_field = &src[channel_start..channel_end];
    if Channel::digit_count(channel_field) > config.max_channel_length {
        return Err(FrameError::FieldTooLarge {
            field: FieldKind::Channel,
            max: config.max_channel_length,
        });
    }
    let channel = Channel::parse(channel_field)?;
    let count = Count::parse(&src[count_start..count_end])?.value();
    if count > config.max_content_length {
        return Err(FrameError::ContentTooLarge {
            size: count,
            max: config.max_content_length,
        });
    }

    let content_start = count_end + 1;
    // Bounded by max_content_length above.
    let total = content_start + count as usize;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(content_start);
    let payload: Bytes = src.split_to(count as usize).freeze();
    Ok(Some(Message::new(verb, channel, Content::Buffered(payload))))
}

/// `tokio_util` codec for messages with in-memory content.
///
/// Useful for simple clients; the hub itself uses the incremental
/// [`FrameReader`](crate::FrameReader) which can spool large content.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: FrameConfig,
}

impl MessageCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        decode_message(src, &self.config)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::BrokenFrame {
                field: FieldKind::Content,
            }),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        if item.verb.len() > self.config.max_verb_length {
            return Err(FrameError::FieldTooLarge {
                field: FieldKind::Verb,
                max: self.config.max_verb_length,
            });
        }
        if item.content.len() > self.config.max_content_length {
            return Err(FrameError::ContentTooLarge {
                size: item.content.len(),
                max: self.config.max_content_length,
            });
        }
        let Some(payload) = item.content.as_bytes() else {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "codec requires in-memory content",
            )));
        };
        encode_message(&item.verb, item.channel, payload, dst);
        Ok(())
    }
}
