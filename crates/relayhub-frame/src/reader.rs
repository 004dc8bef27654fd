use relayhub_transport::Transport;
use tracing::trace;

use crate::channel::Channel;
use crate::codec::FrameConfig;
use crate::content::{Content, ContentSink};
use crate::error::{FrameError, Result};
use crate::grammar::{Count, Field, FieldKind, Verb, SEPARATOR};
use crate::message::Message;

/// Progress of one direction of a stream.
///
/// A direction that is left `InFlight` (its future was dropped) or that hit
/// an error is never used again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirectionState {
    Ready,
    InFlight,
    Failed,
}

/// Reads complete messages from a [`Transport`].
///
/// Handles partial reads internally: fields may straddle any number of
/// chunks, and content is copied out chunk by chunk into memory or a
/// temporary file.
pub struct FrameReader<T> {
    inner: T,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
    scratch: Vec<u8>,
    config: FrameConfig,
    state: DirectionState,
}

impl<T: Transport> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: vec![0u8; config.read_buffer_size.max(1)].into_boxed_slice(),
            pos: 0,
            len: 0,
            scratch: Vec::new(),
            config,
            state: DirectionState::Ready,
        }
    }

    /// Read the next complete message.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when the transport ends
    /// cleanly between frames. Any error, and dropping the returned future
    /// before it completes, leaves the reader unusable.
    pub async fn read_message(&mut self) -> Result<Message> {
        if self.state != DirectionState::Ready {
            return Err(FrameError::Poisoned { direction: "read" });
        }

        self.state = DirectionState::InFlight;
        let result = self.read_message_inner().await;
        self.state = match result {
            Ok(_) => DirectionState::Ready,
            Err(_) => DirectionState::Failed,
        };
        result
    }

    async fn read_message_inner(&mut self) -> Result<Message> {
        let max_digits = self.config.max_channel_length;
        let max_content = self.config.max_content_length;

        let verb = Verb::parse(self.read_field::<Verb>().await?)?;

        let channel_field = self.read_field::<Channel>().await?;
        if Channel::digit_count(channel_field) > max_digits {
            return Err(FrameError::FieldTooLarge {
                field: FieldKind::Channel,
                max: max_digits,
            });
        }
        let channel = Channel::parse(channel_field)?;

        let count = Count::parse(self.read_field::<Count>().await?)?.value();
        if count > max_content {
            return Err(FrameError::ContentTooLarge {
                size: count,
                max: max_content,
            });
        }

        let content = self.read_content(count).await?;
        trace!(verb = %verb, %channel, count, "frame read");
        Ok(Message::new(verb, channel, content))
    }

    /// Read one separator-terminated field.
    ///
    /// Returns a view into the read buffer when the field fits in one
    /// chunk, or into the scratch accumulator when it straddles several.
    async fn read_field<F: Field>(&mut self) -> Result<&[u8]> {
        let limit = self.config.field_limit(F::KIND);
        self.scratch.clear();

        loop {
            if self.pos == self.len {
                let frame_untouched = F::KIND == FieldKind::Verb && self.scratch.is_empty();
                self.fill(F::KIND, frame_untouched).await?;
            }

            let start = self.pos;
            let end = self.len;
            let chunk = &self.buf[..end];
            let run = if self.scratch.is_empty() {
                F::scan(chunk, start)
            } else {
                F::scan_continuation(chunk, start)
            };

            if self.scratch.len() + run > limit {
                return Err(FrameError::FieldTooLarge {
                    field: F::KIND,
                    max: limit,
                });
            }

            let run_end = start + run;
            if run_end < end {
                let found = self.buf[run_end];
                if found != SEPARATOR {
                    return Err(FrameError::MissingSeparator {
                        field: F::KIND,
                        found,
                    });
                }
                self.pos = run_end + 1;
                if self.scratch.is_empty() {
                    return Ok(&self.buf[start..run_end]);
                }
                self.scratch.extend_from_slice(&self.buf[start..run_end]);
                return Ok(&self.scratch);
            }

            self.scratch.extend_from_slice(&self.buf[start..end]);
            self.pos = end;
        }
    }

    /// Copy exactly `count` content bytes into a sink chosen by size.
    async fn read_content(&mut self, count: u64) -> Result<Content> {
        let mut sink = ContentSink::for_len(count, self.config.fast_buffering_threshold).await?;
        let mut remaining = count;
        while remaining > 0 {
            if self.pos == self.len {
                self.fill(FieldKind::Content, false).await?;
            }
            let available = self.len - self.pos;
            let take = usize::try_from(remaining).map_or(available, |r| r.min(available));
            sink.write(&self.buf[self.pos..self.pos + take]).await?;
            self.pos += take;
            remaining -= take as u64;
        }
        Ok(sink.finish().await?)
    }

    /// Pull the next chunk into the read buffer.
    async fn fill(&mut self, field: FieldKind, frame_untouched: bool) -> Result<()> {
        let read = self.inner.pull(&mut self.buf).await?;
        if read == 0 {
            return Err(if frame_untouched {
                FrameError::ConnectionClosed
            } else {
                FrameError::BrokenFrame { field }
            });
        }
        self.pos = 0;
        self.len = read;
        Ok(())
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner transport.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Whether an earlier failure or cancellation made the reader unusable.
    pub fn is_poisoned(&self) -> bool {
        self.state != DirectionState::Ready
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
