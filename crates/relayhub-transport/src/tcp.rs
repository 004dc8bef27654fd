use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{StreamTransport, TransportKind};

/// TCP transport listener.
pub struct TcpSocketListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpSocketListener {
    /// Bind and listen on a TCP address.
    pub async fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let target = format!("{addr:?}");
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                target: target.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { target, source })?;

        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection.
    pub async fn accept(&self) -> Result<StreamTransport<TcpStream>> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        // Frames are small and latency-sensitive.
        let _ = stream.set_nodelay(true);
        debug!(%peer, "accepted tcp connection");
        Ok(StreamTransport::new(stream, TransportKind::Tcp))
    }

    /// The bound local address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Connect to a listening TCP hub.
pub async fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<StreamTransport<TcpStream>> {
    let target = format!("{addr:?}");
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            target: target.clone(),
            source,
        })?;
    let _ = stream.set_nodelay(true);
    debug!(%target, "connected over tcp");
    Ok(StreamTransport::new(stream, TransportKind::Tcp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Transport;

    #[tokio::test]
    async fn bind_accept_connect() {
        let listener = TcpSocketListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();

        let client = tokio::spawn(async move {
            let client = connect(addr).await.unwrap();
            client.push(b"hello").await.unwrap();
            client
        });

        let server = listener.accept().await.unwrap();
        let mut buf = [0u8; 5];
        let mut filled = 0;
        while filled < buf.len() {
            filled += server.pull(&mut buf[filled..]).await.unwrap();
        }
        assert_eq!(&buf, b"hello");
        assert_eq!(server.kind(), TransportKind::Tcp);

        let _client = client.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused_reports_target() {
        let listener = TcpSocketListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        drop(listener);

        let err = connect(addr).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
