use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use relayhub_frame::Message;
use relayhub_transport::Transport;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HubError, Result};
use crate::events::HubEvent;
use crate::hub::{Hub, HubConfig, Snapshot};
use crate::identity::Identity;
use crate::stream::FrameStream;

struct Dispatcher {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Start/stop lifecycle around a [`Hub`].
///
/// While stopped, [`listen`](Self::listen) and the send operations fail
/// with [`HubError::NotRunning`]. Stopping ends the dispatch loop but
/// leaves listen loops to notice on their own before their next read.
/// A stopped service can be started again.
#[derive(Clone)]
pub struct HubService {
    hub: Hub,
    running: Arc<AtomicBool>,
    dispatcher: Arc<Mutex<Option<Dispatcher>>>,
}

impl HubService {
    pub fn new(config: HubConfig) -> Self {
        Self {
            hub: Hub::new(config),
            running: Arc::new(AtomicBool::new(false)),
            dispatcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the dispatch loop. No-op when already running.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if dispatcher.is_some() {
            return;
        }

        let shutdown = CancellationToken::new();
        let hub = self.hub.clone();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { hub.run_dispatch(token).await });
        *dispatcher = Some(Dispatcher { shutdown, task });
        self.running.store(true, Ordering::Release);
        info!("hub started");
    }

    /// Stop the dispatch loop and wait for it to finish. No-op when
    /// already stopped.
    pub async fn stop(&self) {
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(dispatcher) = dispatcher else {
            return;
        };

        self.running.store(false, Ordering::Release);
        dispatcher.shutdown.cancel();
        if let Err(err) = dispatcher.task.await {
            warn!(error = %err, "dispatch task ended abnormally");
        }
        info!("hub stopped");
    }

    /// Stop, then dispose every live connection.
    pub async fn shutdown(&self) {
        self.stop().await;
        let live = self.hub.connections();
        for stream in live.iter() {
            stream.dispose().await;
        }
        info!(connections = live.len(), "hub shut down");
    }

    /// Join a transport and start its listen loop.
    pub fn listen(&self, transport: Arc<dyn Transport>) -> Result<Arc<FrameStream>> {
        self.ensure_running()?;

        let stream = self.hub.join(transport);
        let hub = self.hub.clone();
        let running = Arc::clone(&self.running);
        let listening = Arc::clone(&stream);
        tokio::spawn(async move { hub.listen(listening, &running).await });
        Ok(stream)
    }

    /// Write a message directly to one connection.
    ///
    /// The content is written as-is; forward-only content is consumed.
    pub async fn send(&self, recipient: &FrameStream, message: &mut Message) -> Result<()> {
        self.ensure_running()?;
        recipient.send(message).await?;
        Ok(())
    }

    /// Write a message to several connections in turn.
    ///
    /// Forward-only content is materialized once and rewound for every
    /// recipient. Failed recipients are logged and skipped; returns the
    /// number of successful deliveries. Forward-only content that cannot
    /// be read in full is consumed: the error is returned and the message
    /// keeps empty content.
    pub async fn send_many(
        &self,
        recipients: &[Arc<FrameStream>],
        message: &mut Message,
    ) -> Result<usize> {
        self.ensure_running()?;
        let delivered = self.hub.fan_out(recipients, message, None).await?;
        debug!(
            recipients = recipients.len(),
            delivered, "multi-recipient send finished"
        );
        Ok(delivered)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.hub.subscribe()
    }

    pub fn connections(&self) -> Snapshot {
        self.hub.connections()
    }

    pub fn connection(&self, identity: Identity) -> Option<Arc<FrameStream>> {
        self.hub.connection(identity)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(HubError::NotRunning)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relayhub_frame::{
        Channel, Content, FrameError, FrameReader, FrameWriter, Verb, LOOPBACK,
    };
    use relayhub_transport::StreamTransport;
    use tokio::io::DuplexStream;
    use tokio::time::timeout;

    use super::*;
    use crate::events::DisconnectReason;

    type ClientTransport = Arc<StreamTransport<DuplexStream>>;

    struct Client {
        reader: FrameReader<ClientTransport>,
        writer: FrameWriter<ClientTransport>,
    }

    impl Client {
        async fn send(&mut self, verb: &str, channel: i64, content: &'static str) {
            let mut message = Message::build(verb, channel, content).unwrap();
            self.writer.write_message(&mut message).await.unwrap();
        }

        async fn recv(&mut self) -> Message {
            timeout(Duration::from_secs(2), self.reader.read_message())
                .await
                .expect("message should arrive")
                .expect("message should parse")
        }
    }

    fn connect(service: &HubService) -> (Arc<FrameStream>, Client) {
        connect_with_capacity(service, 4096)
    }

    fn connect_with_capacity(service: &HubService, capacity: usize) -> (Arc<FrameStream>, Client) {
        let (server, client) = tokio::io::duplex(capacity);
        let stream = service
            .listen(Arc::new(StreamTransport::pipe(server)))
            .expect("service should accept connections");
        let transport = Arc::new(StreamTransport::pipe(client));
        let client = Client {
            reader: FrameReader::new(Arc::clone(&transport)),
            writer: FrameWriter::new(transport),
        };
        (stream, client)
    }

    async fn next_disconnect(
        events: &mut broadcast::Receiver<HubEvent>,
    ) -> (Identity, DisconnectReason) {
        loop {
            let event = timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("event should arrive")
                .expect("event channel should stay open");
            if let HubEvent::Disconnected { identity, reason } = event {
                return (identity, reason);
            }
        }
    }

    async fn body(message: &mut Message) -> Vec<u8> {
        message.content.to_bytes().await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn rejects_work_while_stopped() {
        let service = HubService::new(HubConfig::default());
        assert!(!service.is_running());

        let (server, _client) = tokio::io::duplex(64);
        assert!(matches!(
            service.listen(Arc::new(StreamTransport::pipe(server))),
            Err(HubError::NotRunning)
        ));

        let mut message = Message::build("MSG", 0, "x").unwrap();
        assert!(matches!(
            service.send_many(&[], &mut message).await,
            Err(HubError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent_and_restartable() {
        let service = HubService::new(HubConfig::default());
        service.start();
        service.start();
        assert!(service.is_running());
        service.stop().await;
        service.stop().await;
        assert!(!service.is_running());

        service.start();
        let (_a, mut client) = connect(&service);
        client.send("MSG", 0, "hi").await;
        let mut echoed = client.recv().await;
        assert_eq!(echoed.channel, LOOPBACK);
        assert_eq!(body(&mut echoed).await, b"hi");
        service.shutdown().await;
    }

    #[tokio::test]
    async fn three_connections_broadcast_and_reply() {
        let service = HubService::new(HubConfig::default());
        service.start();
        let (a, mut client_a) = connect(&service);
        let (b, mut client_b) = connect(&service);
        let (c, mut client_c) = connect(&service);

        client_a.send("HELLO", -1, "from a").await;
        let mut at_b = client_b.recv().await;
        let mut at_c = client_c.recv().await;
        assert_eq!(b.identity().value() ^ at_b.channel.value(), a.identity().value());
        assert_eq!(c.identity().value() ^ at_c.channel.value(), a.identity().value());
        assert_ne!(at_b.channel, at_c.channel);
        assert_eq!(body(&mut at_b).await, b"from a");
        assert_eq!(body(&mut at_c).await, b"from a");

        client_b
            .send("REPLY", at_b.channel.value(), "b answers")
            .await;
        let mut reply = client_a.recv().await;
        assert_eq!(reply.verb.as_str(), "REPLY");
        assert_eq!(reply.channel, at_b.channel);
        assert_eq!(body(&mut reply).await, b"b answers");

        client_c
            .send("REPLY", at_c.channel.value(), "c answers")
            .await;
        let mut reply = client_a.recv().await;
        assert_eq!(reply.channel, at_c.channel);
        assert_eq!(body(&mut reply).await, b"c answers");

        service.shutdown().await;
    }

    #[tokio::test]
    async fn rate_limited_connection_is_disposed() {
        let service = HubService::new(HubConfig::default().with_receive_rate_limit(Some(16)));
        let mut events = service.subscribe();
        service.start();
        let (a, mut client) = connect(&service);

        client
            .send("FLOOD", 0, "well over sixteen bytes")
            .await;

        assert_eq!(
            next_disconnect(&mut events).await,
            (a.identity(), DisconnectReason::RateLimited)
        );
        let closed = timeout(Duration::from_secs(2), client.reader.read_message())
            .await
            .expect("read should finish");
        assert!(matches!(closed, Err(FrameError::ConnectionClosed)));
        assert!(service.connection(a.identity()).is_none());
        service.stop().await;
    }

    #[tokio::test]
    async fn rate_limit_counts_content_not_headers() {
        let service = HubService::new(HubConfig::default().with_receive_rate_limit(Some(16)));
        service.start();
        let (_a, mut client) = connect(&service);

        // 45 bytes on the wire, 16 of them content.
        client
            .send("A_RATHER_LONG_VERB_NAME", 0, "exactly16bytes!!")
            .await;
        let mut echoed = client.recv().await;
        assert_eq!(body(&mut echoed).await, b"exactly16bytes!!");
        service.stop().await;
    }

    #[tokio::test]
    async fn broken_frame_removes_connection() {
        let service = HubService::new(HubConfig::default());
        let mut events = service.subscribe();
        service.start();
        let (a, client) = connect(&service);

        relayhub_frame::push_all(client.writer.get_ref(), b"BAD!VERB 0 0 ")
            .await
            .unwrap();
        assert_eq!(
            next_disconnect(&mut events).await,
            (a.identity(), DisconnectReason::Failed)
        );
        assert!(service.connections().is_empty());
        service.stop().await;
    }

    #[tokio::test]
    async fn stalled_reader_is_removed_without_blocking_dispatch() {
        let service = HubService::new(HubConfig::default());
        let mut events = service.subscribe();
        service.start();
        let (a, stalled) = connect_with_capacity(&service, 64);
        let (_b, mut client_b) = connect(&service);

        // The broadcast fills the stalled pipe and leaves dispatch mid-write.
        let mut flood = Message::new(
            Verb::new("FLOOD").unwrap(),
            relayhub_frame::BROADCAST,
            vec![b'x'; 10_000],
        );
        client_b.writer.write_message(&mut flood).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        relayhub_frame::push_all(stalled.writer.get_ref(), b"BAD!VERB 0 0 ")
            .await
            .unwrap();
        let (identity, _) = next_disconnect(&mut events).await;
        assert_eq!(identity, a.identity());
        assert!(service.connection(a.identity()).is_none());

        client_b.send("MSG", 0, "still dispatching").await;
        let mut echoed = client_b.recv().await;
        assert_eq!(body(&mut echoed).await, b"still dispatching");
        service.stop().await;
    }

    #[tokio::test]
    async fn send_many_rewinds_streamed_content() {
        let service = HubService::new(HubConfig::default());
        service.start();
        let (b, mut client_b) = connect(&service);
        let (c, mut client_c) = connect(&service);

        let mut message = Message::new(
            Verb::new("FILE").unwrap(),
            Channel::new(0x42),
            Content::from_reader(&b"shared payload"[..], 14),
        );
        let delivered = service.send_many(&[b, c], &mut message).await.unwrap();
        assert_eq!(delivered, 2);
        assert!(message.content.is_rewindable());

        for client in [&mut client_b, &mut client_c] {
            let mut received = client.recv().await;
            assert_eq!(received.channel.value(), 0x42);
            assert_eq!(body(&mut received).await, b"shared payload");
        }
        service.shutdown().await;
    }

    #[tokio::test]
    async fn send_many_with_short_stream_fails_and_consumes_content() {
        let service = HubService::new(HubConfig::default());
        service.start();
        let (b, _client_b) = connect(&service);

        let mut message = Message::new(
            Verb::new("FILE").unwrap(),
            Channel::new(0x42),
            Content::from_reader(&b"short"[..], 100),
        );
        let err = service.send_many(&[b], &mut message).await.unwrap_err();
        assert!(matches!(err, HubError::Io(_)), "{err}");
        assert!(message.content.is_empty());
        assert_eq!(message.channel.value(), 0x42);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn direct_send_reaches_one_connection() {
        let service = HubService::new(HubConfig::default());
        service.start();
        let (a, mut client) = connect(&service);

        let mut message = Message::build("NOTE", 7, "direct").unwrap();
        service.send(&a, &mut message).await.unwrap();
        let mut received = client.recv().await;
        assert_eq!(received.channel.value(), 7);
        assert_eq!(body(&mut received).await, b"direct");

        service.stop().await;
        assert!(matches!(
            service.send(&a, &mut message).await,
            Err(HubError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn shutdown_disposes_connections() {
        let service = HubService::new(HubConfig::default());
        let mut events = service.subscribe();
        service.start();
        let (a, mut client) = connect(&service);

        service.shutdown().await;
        assert!(!service.is_running());
        assert_eq!(
            next_disconnect(&mut events).await,
            (a.identity(), DisconnectReason::Stopped)
        );
        let closed = timeout(Duration::from_secs(2), client.reader.read_message())
            .await
            .expect("read should finish");
        assert!(matches!(closed, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn listen_loop_exits_after_stop() {
        let service = HubService::new(HubConfig::default());
        let mut events = service.subscribe();
        service.start();
        let (a, mut client) = connect(&service);

        service.stop().await;
        // The loop is parked in a read; it notices the stop after this frame.
        client.send("LATE", 0, "queued").await;
        assert_eq!(
            next_disconnect(&mut events).await,
            (a.identity(), DisconnectReason::Stopped)
        );

        // Queued messages are dispatched once the service runs again, but
        // the sender has left by then.
        service.start();
        let (_b, mut other) = connect(&service);
        other.send("MSG", 0, "fresh").await;
        let received = other.recv().await;
        assert_eq!(received.verb.as_str(), "MSG");
        service.shutdown().await;
    }
}
