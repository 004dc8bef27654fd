use std::sync::Arc;

use async_trait::async_trait;
use relayhub_transport::{TcpSocketListener, Transport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HubError, Result};
use crate::service::HubService;

/// A listener that yields connected transports.
#[async_trait]
pub trait Acceptor: Send + Sync {
    /// Wait for the next connection.
    async fn accept_transport(&self) -> relayhub_transport::Result<Arc<dyn Transport>>;

    /// Human-readable bound address, for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl Acceptor for TcpSocketListener {
    async fn accept_transport(&self) -> relayhub_transport::Result<Arc<dyn Transport>> {
        Ok(Arc::new(self.accept().await?))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.local_addr())
    }
}

#[cfg(unix)]
#[async_trait]
impl Acceptor for relayhub_transport::UnixSocketListener {
    async fn accept_transport(&self) -> relayhub_transport::Result<Arc<dyn Transport>> {
        Ok(Arc::new(self.accept().await?))
    }

    fn describe(&self) -> String {
        format!("unix://{}", self.path().display())
    }
}

/// Accept connections and hand each to `service` until `shutdown` fires.
///
/// Accept errors are logged and the loop continues. Connections that
/// arrive while the service is stopped are closed immediately.
pub async fn serve<A: Acceptor + ?Sized>(
    service: &HubService,
    acceptor: &A,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = acceptor.describe();
    info!(%address, "accepting connections");

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = acceptor.accept_transport() => accepted,
        };

        let transport = match accepted {
            Ok(transport) => transport,
            Err(err) => {
                warn!(%address, error = %err, "accept failed");
                continue;
            }
        };

        match service.listen(Arc::clone(&transport)) {
            Ok(stream) => {
                debug!(%address, identity = %stream.identity(), "connection accepted");
            }
            Err(HubError::NotRunning) => {
                debug!(%address, "hub not running, closing connection");
                transport.dispose().await;
            }
            Err(err) => return Err(err),
        }
    }

    info!(%address, "stopped accepting connections");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relayhub_frame::{FrameError, FrameReader, FrameWriter, Message, LOOPBACK};
    use tokio::time::timeout;

    use super::*;
    use crate::hub::HubConfig;

    async fn loopback_round_trip<T: Transport + Clone>(transport: T) {
        let mut writer = FrameWriter::new(transport.clone());
        let mut reader = FrameReader::new(transport);
        let mut message = Message::build("PING", 0, "over the socket").unwrap();
        writer.write_message(&mut message).await.unwrap();

        let mut echoed = timeout(Duration::from_secs(2), reader.read_message())
            .await
            .expect("echo should arrive")
            .expect("echo should parse");
        assert_eq!(echoed.verb.as_str(), "PING");
        assert_eq!(echoed.channel, LOOPBACK);
        assert_eq!(
            echoed.content.to_bytes().await.unwrap().as_ref(),
            b"over the socket"
        );
    }

    #[tokio::test]
    async fn tcp_accept_loop_feeds_service() {
        let service = HubService::new(HubConfig::default());
        service.start();
        let listener = TcpSocketListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let shutdown = CancellationToken::new();

        let serving = {
            let service = service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(&service, &listener, shutdown).await })
        };

        let client = Arc::new(relayhub_transport::tcp::connect(addr).await.unwrap());
        loopback_round_trip(client).await;
        assert_eq!(service.connections().len(), 1);

        shutdown.cancel();
        serving.await.unwrap().unwrap();
        service.shutdown().await;
    }

    #[tokio::test]
    async fn connections_are_closed_while_stopped() {
        let service = HubService::new(HubConfig::default());
        let listener = TcpSocketListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        let shutdown = CancellationToken::new();

        let serving = {
            let service = service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(&service, &listener, shutdown).await })
        };

        let client = relayhub_transport::tcp::connect(addr).await.unwrap();
        let mut reader = FrameReader::new(client);
        let closed = timeout(Duration::from_secs(2), reader.read_message())
            .await
            .expect("read should finish");
        assert!(matches!(closed, Err(FrameError::ConnectionClosed)));
        assert!(service.connections().is_empty());

        shutdown.cancel();
        serving.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_accept_loop_feeds_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.sock");
        let service = HubService::new(HubConfig::default());
        service.start();
        let listener = relayhub_transport::UnixSocketListener::bind(&path).unwrap();
        assert!(listener.describe().starts_with("unix://"));
        let shutdown = CancellationToken::new();

        let serving = {
            let service = service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { serve(&service, &listener, shutdown).await })
        };

        let client = Arc::new(relayhub_transport::uds::connect(&path).await.unwrap());
        loopback_round_trip(client).await;

        shutdown.cancel();
        serving.await.unwrap().unwrap();
        service.shutdown().await;
    }
}
