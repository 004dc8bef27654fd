use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TransportError};

/// A connected duplex byte transport.
///
/// Reads and writes may be in flight at the same time; callers never issue
/// two concurrent pulls (or two concurrent pushes) on the same transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the transport can still carry bytes.
    fn is_alive(&self) -> bool;

    /// Read the next available chunk into `buf`.
    ///
    /// `Ok(0)` signals end of input.
    async fn pull(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes from `buf`, returning how many were accepted.
    ///
    /// `Ok(0)` signals that the sink is closed.
    async fn push(&self, buf: &[u8]) -> Result<usize>;

    /// Flush anything buffered below this transport.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Release the underlying OS resource. Idempotent.
    async fn dispose(&self);

    /// Transport name for diagnostics.
    fn kind(&self) -> TransportKind;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn is_alive(&self) -> bool {
        (**self).is_alive()
    }

    async fn pull(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).pull(buf).await
    }

    async fn push(&self, buf: &[u8]) -> Result<usize> {
        (**self).push(buf).await
    }

    async fn flush(&self) -> Result<()> {
        (**self).flush().await
    }

    async fn dispose(&self) {
        (**self).dispose().await
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }
}

/// The concrete socket kind behind a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Unix,
    Pipe,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Unix => "unix-domain-socket",
            TransportKind::Pipe => "pipe",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapts any tokio byte stream into a [`Transport`].
///
/// The stream is split so a pull and a push can run concurrently. Disposing
/// wakes any pending pull with [`TransportError::Shutdown`].
pub struct StreamTransport<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    alive: AtomicBool,
    closed: CancellationToken,
    kind: TransportKind,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a connected stream.
    pub fn new(stream: S, kind: TransportKind) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            alive: AtomicBool::new(true),
            closed: CancellationToken::new(),
            kind,
        }
    }

    /// Wrap an in-process pipe, such as one end of [`tokio::io::duplex`].
    pub fn pipe(stream: S) -> Self {
        Self::new(stream, TransportKind::Pipe)
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Gives up with [`TransportError::Shutdown`] once disposed.
    async fn lock_writer(&self) -> Result<MutexGuard<'_, WriteHalf<S>>> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Shutdown),
            writer = self.writer.lock() => Ok(writer),
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn pull(&self, buf: &mut [u8]) -> Result<usize> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Shutdown);
        }

        let mut reader = self.reader.lock().await;
        loop {
            let result = tokio::select! {
                _ = self.closed.cancelled() => return Err(TransportError::Shutdown),
                result = reader.read(buf) => result,
            };
            match result {
                Ok(0) if !buf.is_empty() => {
                    self.mark_dead();
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.mark_dead();
                    return Err(TransportError::Io(err));
                }
            }
        }
    }

    async fn push(&self, buf: &[u8]) -> Result<usize> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Shutdown);
        }

        let mut writer = self.lock_writer().await?;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Err(TransportError::Shutdown),
                result = writer.write(buf) => result,
            };
            match result {
                Ok(0) if !buf.is_empty() => {
                    self.mark_dead();
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.mark_dead();
                    return Err(TransportError::Io(err));
                }
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        let mut writer = self.lock_writer().await?;
        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Err(TransportError::Shutdown),
            result = writer.flush() => result,
        };
        result.map_err(|err| {
            self.mark_dead();
            TransportError::Io(err)
        })
    }

    async fn dispose(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.mark_dead();
        self.closed.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            debug!(kind = %self.kind, error = %err, "transport shutdown reported an error");
        }
    }

    fn kind(&self) -> TransportKind {
        self.kind
    }
}

impl<S> fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport")
            .field("type", &self.kind.as_str())
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pull_and_push_over_pipe() {
        let (left, right) = tokio::io::duplex(64);
        let left = StreamTransport::pipe(left);
        let right = StreamTransport::pipe(right);

        assert_eq!(left.push(b"hello").await.unwrap(), 5);

        let mut buf = [0u8; 16];
        let n = right.pull(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(right.kind(), TransportKind::Pipe);
    }

    #[tokio::test]
    async fn pull_returns_zero_at_end_of_input() {
        let (left, right) = tokio::io::duplex(64);
        let right = StreamTransport::pipe(right);
        drop(left);

        let mut buf = [0u8; 8];
        assert_eq!(right.pull(&mut buf).await.unwrap(), 0);
        assert!(!right.is_alive());
    }

    #[tokio::test]
    async fn dispose_wakes_pending_pull() {
        let (_left, right) = tokio::io::duplex(64);
        let right = Arc::new(StreamTransport::pipe(right));

        let puller = {
            let right = Arc::clone(&right);
            tokio::spawn(async move {
                let mut buf = [0u8; 8];
                right.pull(&mut buf).await
            })
        };

        tokio::task::yield_now().await;
        right.dispose().await;

        let result = puller.await.unwrap();
        assert!(matches!(result, Err(TransportError::Shutdown)));
        assert!(!right.is_alive());
    }

    #[tokio::test]
    async fn dispose_releases_push_blocked_on_full_pipe() {
        let (_left, right) = tokio::io::duplex(8);
        let right = Arc::new(StreamTransport::pipe(right));

        // Nobody reads the other end, so the second push cannot complete.
        assert_eq!(right.push(&[0u8; 8]).await.unwrap(), 8);
        let pusher = {
            let right = Arc::clone(&right);
            tokio::spawn(async move { right.push(b"stuck").await })
        };
        tokio::task::yield_now().await;

        tokio::time::timeout(std::time::Duration::from_secs(2), right.dispose())
            .await
            .expect("dispose should not wait for the blocked push");
        let result = pusher.await.unwrap();
        assert!(matches!(result, Err(TransportError::Shutdown)));
        assert!(matches!(right.flush().await, Err(TransportError::Shutdown)));
    }

    #[tokio::test]
    async fn dispose_closes_peer_side() {
        let (left, right) = tokio::io::duplex(64);
        let left = StreamTransport::pipe(left);
        let right = StreamTransport::pipe(right);

        left.dispose().await;
        left.dispose().await;

        let mut buf = [0u8; 8];
        assert_eq!(right.pull(&mut buf).await.unwrap(), 0);
        assert!(matches!(
            left.push(b"x").await,
            Err(TransportError::Shutdown)
        ));
    }

    #[tokio::test]
    async fn arc_transport_delegates() {
        let (left, right) = tokio::io::duplex(64);
        let left: Arc<dyn Transport> = Arc::new(StreamTransport::pipe(left));
        let right = StreamTransport::pipe(right);

        left.push(b"ok").await.unwrap();
        left.flush().await.unwrap();

        let mut buf = [0u8; 4];
        let n = right.pull(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ok");
        assert!(left.is_alive());
    }
}
