use bytes::Bytes;

use crate::channel::Channel;
use crate::content::Content;
use crate::error::Result;
use crate::grammar::Verb;

/// One message: `<verb> <channel> <count> <content>` on the wire.
///
/// The count is never stored; it is recomputed from the content on every
/// write.
#[derive(Debug)]
pub struct Message {
    /// Command tag.
    pub verb: Verb,
    /// Identity-relative address.
    pub channel: Channel,
    /// Opaque payload.
    pub content: Content,
}

impl Message {
    /// Create a message from already-validated parts.
    pub fn new(verb: Verb, channel: Channel, content: impl Into<Content>) -> Self {
        Self {
            verb,
            channel,
            content: content.into(),
        }
    }

    /// Validate `verb` and build a message with in-memory content.
    pub fn build(verb: &str, channel: i64, content: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::new(
            Verb::new(verb)?,
            Channel::new(channel),
            Content::Buffered(content.into()),
        ))
    }

    /// Total number of bytes this message occupies on the wire.
    pub fn length(&self) -> u64 {
        let content_len = self.content.len();
        let fields = self.verb.len() + self.channel.to_string().len() + decimal_len(content_len);
        fields as u64 + 3 + content_len
    }
}

fn decimal_len(mut value: u64) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}
