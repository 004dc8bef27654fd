use std::fmt;
use std::sync::Arc;

use relayhub_frame::{FrameConfig, FrameReader, FrameWriter, Message};
use relayhub_transport::{Transport, TransportKind};
use tokio::sync::Mutex;

use crate::identity::Identity;

/// A connected transport with its frame reader, frame writer and identity.
///
/// Reads are serialized with each other, as are writes; a read and a write
/// may be in flight at the same time.
pub struct FrameStream {
    identity: Identity,
    transport: Arc<dyn Transport>,
    reader: Mutex<FrameReader<Arc<dyn Transport>>>,
    writer: Mutex<FrameWriter<Arc<dyn Transport>>>,
}

impl FrameStream {
    pub fn new(identity: Identity, transport: Arc<dyn Transport>, config: &FrameConfig) -> Self {
        Self {
            identity,
            reader: Mutex::new(FrameReader::with_config(
                Arc::clone(&transport),
                config.clone(),
            )),
            writer: Mutex::new(FrameWriter::with_config(
                Arc::clone(&transport),
                config.clone(),
            )),
            transport,
        }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Read the next message.
    pub async fn read_message(&self) -> relayhub_frame::Result<Message> {
        self.reader.lock().await.read_message().await
    }

    /// Write a message and flush.
    pub async fn send(&self, message: &mut Message) -> relayhub_frame::Result<()> {
        self.writer.lock().await.write_message(message).await
    }

    /// Close the transport. Pending reads on it complete with an error.
    pub async fn dispose(&self) {
        self.transport.dispose().await;
    }
}

impl fmt::Debug for FrameStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStream")
            .field("identity", &self.identity)
            .field("kind", &self.kind())
            .field("alive", &self.is_alive())
            .finish()
    }
}
