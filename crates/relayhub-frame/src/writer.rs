use std::io;

use bytes::BytesMut;
use relayhub_transport::Transport;
use tracing::trace;

use crate::channel::Channel;
use crate::codec::{encode_header, FrameConfig};
use crate::content::Content;
use crate::error::{FrameError, Result};
use crate::grammar::{FieldKind, Verb};
use crate::message::Message;
use crate::reader::DirectionState;

/// Writes complete messages to a [`Transport`].
///
/// Output is staged through a fixed-size buffer; content is copied into it
/// chunk by chunk, so spooled and streamed content never has to fit in
/// memory.
pub struct FrameWriter<T> {
    inner: T,
    buf: Box<[u8]>,
    filled: usize,
    header: BytesMut,
    config: FrameConfig,
    state: DirectionState,
}

impl<T: Transport> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: vec![0u8; config.write_buffer_size.max(1)].into_boxed_slice(),
            filled: 0,
            header: BytesMut::with_capacity(64),
            config,
            state: DirectionState::Ready,
        }
    }

    /// Write a complete message and flush the transport.
    ///
    /// Rewindable content is rewound first and again afterwards, so the
    /// same message can be written to several writers in turn.
    pub async fn write_message(&mut self, message: &mut Message) -> Result<()> {
        self.send(&message.verb, message.channel, &mut message.content)
            .await
    }

    /// Encode and send one message built from its parts.
    pub async fn send(&mut self, verb: &Verb, channel: Channel, content: &mut Content) -> Result<()> {
        if self.state != DirectionState::Ready {
            return Err(FrameError::Poisoned { direction: "write" });
        }
        self.check_limits(verb, channel, content)?;

        self.state = DirectionState::InFlight;
        let result = self.send_inner(verb, channel, content).await;
        self.state = match result {
            Ok(()) => DirectionState::Ready,
            Err(_) => DirectionState::Failed,
        };
        result
    }

    fn check_limits(&self, verb: &Verb, channel: Channel, content: &Content) -> Result<()> {
        if verb.len() > self.config.max_verb_length {
            return Err(FrameError::FieldTooLarge {
                field: FieldKind::Verb,
                max: self.config.max_verb_length,
            });
        }
        let channel_text = channel.to_string();
        if Channel::digit_count(channel_text.as_bytes()) > self.config.max_channel_length {
            return Err(FrameError::FieldTooLarge {
                field: FieldKind::Channel,
                max: self.config.max_channel_length,
            });
        }
        if content.len() > self.config.max_content_length {
            return Err(FrameError::ContentTooLarge {
                size: content.len(),
                max: self.config.max_content_length,
            });
        }
        Ok(())
    }

    async fn send_inner(
        &mut self,
        verb: &Verb,
        channel: Channel,
        content: &mut Content,
    ) -> Result<()> {
        if content.is_rewindable() {
            content.rewind().await?;
        }

        let len = content.len();
        let mut header = std::mem::take(&mut self.header);
        header.clear();
        encode_header(verb, channel, len, &mut header);
        let staged = self.stage(&header).await;
        self.header = header;
        staged?;

        let mut written = 0u64;
        while written < len {
            if self.filled == self.buf.len() {
                self.drain().await?;
            }
            let room = self.buf.len() - self.filled;
            let want = usize::try_from(len - written).map_or(room, |left| left.min(room));
            let n = content
                .read_chunk(written, &mut self.buf[self.filled..self.filled + want])
                .await?;
            if n == 0 {
                return Err(FrameError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("content ended {} bytes early", len - written),
                )));
            }
            self.filled += n;
            written += n as u64;
        }

        self.drain().await?;
        self.inner.flush().await?;
        if content.is_rewindable() {
            content.rewind().await?;
        }
        trace!(verb = %verb, %channel, count = len, "frame written");
        Ok(())
    }

    /// Copy `bytes` into the staging buffer, pushing whenever it fills.
    async fn stage(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let room = self.buf.len() - self.filled;
            let n = room.min(bytes.len());
            self.buf[self.filled..self.filled + n].copy_from_slice(&bytes[..n]);
            self.filled += n;
            bytes = &bytes[n..];
            if self.filled == self.buf.len() {
                self.drain().await?;
            }
        }
        Ok(())
    }

    async fn drain(&mut self) -> Result<()> {
        push_all(&self.inner, &self.buf[..self.filled]).await?;
        self.filled = 0;
        Ok(())
    }

    /// Flush the underlying transport.
    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Whether an earlier failure or cancellation made the writer unusable.
    pub fn is_poisoned(&self) -> bool {
        self.state != DirectionState::Ready
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Push all of `buf`, looping over partial pushes.
///
/// A push that accepts zero bytes means the sink is gone.
pub async fn push_all<T: Transport + ?Sized>(transport: &T, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = transport.push(buf).await?;
        if n == 0 {
            return Err(FrameError::SinkClosed);
        }
        buf = &buf[n..];
    }
    Ok(())
}
