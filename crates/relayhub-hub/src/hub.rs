use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use relayhub_frame::{Channel, FrameConfig, Message};
use relayhub_transport::Transport;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{HubError, Result};
use crate::events::{DisconnectReason, HubEvent};
use crate::identity::Identity;
use crate::rate_limit::RateLimiter;
use crate::stream::FrameStream;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Immutable view of the live connections, replaced whole on join/leave.
pub type Snapshot = Arc<[Arc<FrameStream>]>;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Limits and buffer sizes for every connection.
    pub frame: FrameConfig,
    /// Per-connection receive ceiling in bytes per rolling second.
    /// `None` disables rate limiting.
    pub receive_rate_limit: Option<u64>,
    /// Number of events buffered for slow subscribers.
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            receive_rate_limit: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl HubConfig {
    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_receive_rate_limit(mut self, bytes_per_second: Option<u64>) -> Self {
        self.receive_rate_limit = bytes_per_second;
        self
    }

    pub fn with_max_content_length(mut self, max: u64) -> Self {
        self.frame.max_content_length = max;
        self
    }

    pub fn with_fast_buffering_threshold(mut self, threshold: u64) -> Self {
        self.frame.fast_buffering_threshold = threshold;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Where a message from a given source goes.
#[derive(Debug)]
pub enum Route {
    /// Back to the sender.
    Loopback(Arc<FrameStream>),
    /// To every other live connection.
    Broadcast(Vec<Arc<FrameStream>>),
    /// To exactly one other connection.
    Unicast(Arc<FrameStream>),
    /// Nobody is addressed; the message is dropped.
    Miss,
}

struct Envelope {
    source: Identity,
    message: Message,
}

struct Inner {
    config: HubConfig,
    live: RwLock<Snapshot>,
    queue: mpsc::UnboundedSender<Envelope>,
    // Held by the dispatch task for as long as it runs.
    pending: Mutex<mpsc::UnboundedReceiver<Envelope>>,
    events: broadcast::Sender<HubEvent>,
}

/// The routing engine: live connections, the dispatch queue and the
/// identity-relative addressing rules.
///
/// Cloning is cheap and every clone refers to the same hub.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Inner>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let (queue, pending) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                live: RwLock::new(Vec::new().into()),
                queue,
                pending: Mutex::new(pending),
                events,
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Subscribe to connection and traffic events.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.events.subscribe()
    }

    /// Current live connections.
    pub fn connections(&self) -> Snapshot {
        Arc::clone(&self.inner.live.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Live connection with the given identity.
    pub fn connection(&self, identity: Identity) -> Option<Arc<FrameStream>> {
        self.connections()
            .iter()
            .find(|stream| stream.identity() == identity)
            .cloned()
    }

    /// Add a transport to the live set under a fresh identity.
    pub fn join(&self, transport: Arc<dyn Transport>) -> Arc<FrameStream> {
        let stream = {
            let mut live = self
                .inner
                .live
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let identity = unique_identity(&live, Identity::random);
            let stream = Arc::new(FrameStream::new(
                identity,
                transport,
                &self.inner.config.frame,
            ));
            let mut next = Vec::with_capacity(live.len() + 1);
            next.extend(live.iter().cloned());
            next.push(Arc::clone(&stream));
            *live = next.into();
            stream
        };

        debug!(identity = %stream.identity(), kind = %stream.kind(), "connection joined");
        self.publish(HubEvent::Connected {
            identity: stream.identity(),
            kind: stream.kind(),
        });
        stream
    }

    /// Remove a connection from the live set.
    ///
    /// Returns `None` if it had already left.
    pub fn leave(&self, identity: Identity, reason: DisconnectReason) -> Option<Arc<FrameStream>> {
        let removed = {
            let mut live = self
                .inner
                .live
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let index = live
                .iter()
                .position(|stream| stream.identity() == identity)?;
            let removed = Arc::clone(&live[index]);
            let next: Vec<_> = live
                .iter()
                .filter(|stream| stream.identity() != identity)
                .cloned()
                .collect();
            *live = next.into();
            removed
        };

        debug!(%identity, %reason, "connection left");
        self.publish(HubEvent::Disconnected { identity, reason });
        Some(removed)
    }

    /// Resolve the destinations of a message sent by `source` on `channel`.
    pub fn route(&self, source: Identity, channel: Channel) -> Route {
        let live = self.connections();
        if channel.is_broadcast() {
            let recipients = live
                .iter()
                .filter(|stream| stream.identity() != source)
                .cloned()
                .collect();
            return Route::Broadcast(recipients);
        }

        let target = source.resolve(channel);
        match live.iter().find(|stream| stream.identity() == target) {
            Some(stream) if channel.is_loopback() => Route::Loopback(Arc::clone(stream)),
            Some(stream) => Route::Unicast(Arc::clone(stream)),
            None => Route::Miss,
        }
    }

    /// Deliver one message according to its channel.
    ///
    /// Never fails: routing misses are dropped and per-recipient send
    /// failures are logged.
    pub async fn dispatch(&self, source: Identity, mut message: Message) {
        match self.route(source, message.channel) {
            Route::Loopback(stream) | Route::Unicast(stream) => {
                self.deliver(&stream, &mut message).await;
            }
            Route::Broadcast(recipients) => {
                if let Err(err) = self.fan_out(&recipients, &mut message, Some(source)).await {
                    warn!(%source, error = %err, "broadcast dropped");
                }
            }
            Route::Miss => {
                debug!(%source, channel = %message.channel, verb = %message.verb, "routing miss, message dropped");
            }
        }
    }

    /// Send one message to several recipients in turn.
    ///
    /// Forward-only content is first materialized into one rewindable
    /// copy. With `relative_to` set, each recipient sees the channel
    /// relative to that identity, and the original channel is restored
    /// afterwards. Returns the number of successful deliveries.
    ///
    /// If materializing fails, forward-only content has been partly read
    /// and cannot be recovered; the message is left with empty content.
    pub(crate) async fn fan_out(
        &self,
        recipients: &[Arc<FrameStream>],
        message: &mut Message,
        relative_to: Option<Identity>,
    ) -> Result<usize> {
        if recipients.is_empty() {
            return Ok(0);
        }
        if !message.content.is_rewindable() {
            let content = std::mem::take(&mut message.content);
            message.content = content
                .materialize(self.inner.config.frame.fast_buffering_threshold)
                .await?;
        }

        let original = message.channel;
        let mut delivered = 0;
        for recipient in recipients {
            if let Some(source) = relative_to {
                message.channel = source.relative_to(recipient.identity());
            }
            if self.deliver(recipient, message).await {
                delivered += 1;
            }
        }
        message.channel = original;
        Ok(delivered)
    }

    /// Write to one recipient, disposing it on failure.
    async fn deliver(&self, recipient: &FrameStream, message: &mut Message) -> bool {
        match recipient.send(message).await {
            Ok(()) => true,
            Err(err) => {
                warn!(recipient = %recipient.identity(), error = %err, "send failed, skipping recipient");
                recipient.dispose().await;
                false
            }
        }
    }

    /// Read messages from one connection into the dispatch queue until it
    /// fails, is rate limited, or `running` is cleared.
    pub(crate) async fn listen(&self, stream: Arc<FrameStream>, running: &AtomicBool) {
        let identity = stream.identity();
        let mut limiter = self
            .inner
            .config
            .receive_rate_limit
            .map(RateLimiter::per_second);

        let reason = loop {
            if !running.load(Ordering::Acquire) {
                break DisconnectReason::Stopped;
            }

            let message = match stream.read_message().await {
                Ok(message) => message,
                Err(_) if !running.load(Ordering::Acquire) => break DisconnectReason::Stopped,
                Err(err) if err.is_clean_close() => break DisconnectReason::Closed,
                Err(err) => {
                    debug!(%identity, error = %err, "read failed");
                    break DisconnectReason::Failed;
                }
            };

            if let Some(limiter) = limiter.as_mut() {
                if let Err(received) = limiter.record(message.content.len()) {
                    let err = HubError::RateLimited {
                        received,
                        limit: limiter.limit(),
                    };
                    warn!(%identity, error = %err, "disposing connection");
                    break DisconnectReason::RateLimited;
                }
            }

            self.publish(HubEvent::Received {
                identity,
                verb: message.verb.clone(),
                channel: message.channel,
                len: message.content.len(),
            });
            if self
                .inner
                .queue
                .send(Envelope {
                    source: identity,
                    message,
                })
                .is_err()
            {
                break DisconnectReason::Stopped;
            }
        };

        stream.dispose().await;
        self.leave(identity, reason);
    }

    /// Dispatch queued messages in order until `shutdown` fires.
    ///
    /// Messages still queued at shutdown stay queued for the next run.
    pub(crate) async fn run_dispatch(&self, shutdown: CancellationToken) {
        let mut pending = self.inner.pending.lock().await;
        loop {
            let envelope = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = pending.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.dispatch(envelope.source, envelope.message).await;
        }
    }

    fn publish(&self, event: HubEvent) {
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }
}

/// Draw identities until one relates to every live identity through a
/// non-reserved channel.
fn unique_identity(live: &[Arc<FrameStream>], mut generate: impl FnMut() -> Identity) -> Identity {
    loop {
        let candidate = generate();
        if !live
            .iter()
            .any(|stream| candidate.conflicts_with(stream.identity()))
        {
            return candidate;
        }
    }
}
