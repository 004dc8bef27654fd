//! Message content and the sinks it is buffered into.
//!
//! Small content lives in memory; content at or above the fast-buffering
//! threshold is spooled to an anonymous temporary file that the OS deletes
//! once the handle is dropped.

use std::fmt;
use std::io::{self, SeekFrom};
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

/// Opaque message content of a known length.
pub enum Content {
    /// Content held in memory.
    Buffered(Bytes),
    /// Content spooled to an auto-deleting temporary file.
    Spooled(SpooledContent),
    /// Forward-only content that can be read exactly once.
    Streamed(StreamedContent),
}

/// Content backed by an anonymous temporary file.
pub struct SpooledContent {
    file: File,
    len: u64,
}

/// Content backed by a caller-supplied reader.
pub struct StreamedContent {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    len: u64,
}

impl Content {
    /// Empty in-memory content.
    pub fn empty() -> Self {
        Content::Buffered(Bytes::new())
    }

    /// Forward-only content read from `reader`, which must yield `len` bytes.
    pub fn from_reader(reader: impl AsyncRead + Send + 'static, len: u64) -> Self {
        Content::Streamed(StreamedContent {
            reader: Box::pin(reader),
            len,
        })
    }

    /// Content length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Content::Buffered(bytes) => bytes.len() as u64,
            Content::Spooled(spooled) => spooled.len,
            Content::Streamed(streamed) => streamed.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the content can be read again from the start.
    pub fn is_rewindable(&self) -> bool {
        !matches!(self, Content::Streamed(_))
    }

    /// Whether the content lives in a temporary file.
    pub fn is_spooled(&self) -> bool {
        matches!(self, Content::Spooled(_))
    }

    /// In-memory bytes, if the content is buffered.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Content::Buffered(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Reset the read position to the start.
    pub async fn rewind(&mut self) -> io::Result<()> {
        match self {
            Content::Buffered(_) => Ok(()),
            Content::Spooled(spooled) => {
                spooled.file.seek(SeekFrom::Start(0)).await?;
                Ok(())
            }
            Content::Streamed(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "streamed content cannot be rewound",
            )),
        }
    }

    /// Turn forward-only content into a rewindable copy.
    ///
    /// Uses the same memory-or-disk rule as the frame reader. Rewindable
    /// content is returned unchanged.
    pub async fn materialize(self, threshold: u64) -> io::Result<Content> {
        let Content::Streamed(mut streamed) = self else {
            return Ok(self);
        };

        let mut sink = ContentSink::for_len(streamed.len, threshold).await?;
        let mut chunk = vec![0u8; 8 * 1024];
        let mut remaining = streamed.len;
        while remaining > 0 {
            let want = chunk.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let n = streamed.reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                return Err(short_content(remaining));
            }
            sink.write(&chunk[..n]).await?;
            remaining -= n as u64;
        }
        sink.finish().await
    }

    /// Read the next chunk from the current position into `buf`.
    ///
    /// In-memory content is always read in full; callers track the offset
    /// for it themselves.
    pub(crate) async fn read_chunk(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Content::Buffered(bytes) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
                let n = buf.len().min(bytes.len() - start);
                buf[..n].copy_from_slice(&bytes[start..start + n]);
                Ok(n)
            }
            Content::Spooled(spooled) => spooled.file.read(buf).await,
            Content::Streamed(streamed) => streamed.reader.read(buf).await,
        }
    }

    /// Copy the whole content into memory, leaving it rewound.
    ///
    /// Forward-only content is consumed and replaced by its buffered copy.
    pub async fn to_bytes(&mut self) -> io::Result<Bytes> {
        if let Content::Buffered(bytes) = self {
            return Ok(bytes.clone());
        }

        self.rewind().await.ok();
        let len = usize::try_from(self.len())
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "content exceeds memory"))?;
        let mut out = BytesMut::zeroed(len);
        let mut filled = 0usize;
        while filled < len {
            let n = self.read_chunk(filled as u64, &mut out[filled..]).await?;
            if n == 0 {
                return Err(short_content((len - filled) as u64));
            }
            filled += n;
        }
        let bytes = out.freeze();

        if self.is_rewindable() {
            self.rewind().await?;
        } else {
            *self = Content::Buffered(bytes.clone());
        }
        Ok(bytes)
    }
}

fn short_content(missing: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("content ended {missing} bytes early"),
    )
}

impl From<Bytes> for Content {
    fn from(bytes: Bytes) -> Self {
        Content::Buffered(bytes)
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Buffered(bytes.into())
    }
}

impl From<&'static [u8]> for Content {
    fn from(bytes: &'static [u8]) -> Self {
        Content::Buffered(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Content {
    fn from(text: &'static str) -> Self {
        Content::Buffered(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Buffered(text.into())
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::empty()
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Content::Spooled(spooled) => f.debug_tuple("Spooled").field(&spooled.len).finish(),
            Content::Streamed(streamed) => {
                f.debug_tuple("Streamed").field(&streamed.len).finish()
            }
        }
    }
}

/// Destination for content bytes while they arrive.
pub(crate) enum ContentSink {
    Memory(BytesMut),
    File { file: BufWriter<File>, written: u64 },
}

impl ContentSink {
    /// Pick memory below `threshold`, a temporary file at or above it.
    pub(crate) async fn for_len(len: u64, threshold: u64) -> io::Result<Self> {
        if len < threshold {
            let capacity = usize::try_from(len).unwrap_or(0);
            return Ok(ContentSink::Memory(BytesMut::with_capacity(capacity)));
        }

        let file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(io::Error::other)??;
        Ok(ContentSink::File {
            file: BufWriter::new(File::from_std(file)),
            written: 0,
        })
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            ContentSink::Memory(buf) => {
                buf.extend_from_slice(chunk);
                Ok(())
            }
            ContentSink::File { file, written } => {
                file.write_all(chunk).await?;
                *written += chunk.len() as u64;
                Ok(())
            }
        }
    }

    /// Seal the sink into content positioned at its start.
    pub(crate) async fn finish(self) -> io::Result<Content> {
        match self {
            ContentSink::Memory(buf) => Ok(Content::Buffered(buf.freeze())),
            ContentSink::File { mut file, written } => {
                file.flush().await?;
                let mut file = file.into_inner();
                file.seek(SeekFrom::Start(0)).await?;
                Ok(Content::Spooled(SpooledContent { file, len: written }))
            }
        }
    }
}
