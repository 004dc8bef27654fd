//! Run a hub inside a process and talk to it over TCP.
//!
//! ```sh
//! cargo run -p relayhub --example embedded-hub
//! ```

use std::sync::Arc;

use relayhub::frame::{FrameReader, FrameWriter, Message, BROADCAST};
use relayhub::hub::{serve, HubConfig, HubEvent, HubService};
use relayhub::transport::{TcpSocketListener, Transport};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpSocketListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr();

    let service = HubService::new(HubConfig::default());
    let mut events = service.subscribe();
    service.start();

    let shutdown = CancellationToken::new();
    let server = {
        let service = service.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { serve(&service, &listener, shutdown).await })
    };

    let alice = Arc::new(relayhub::transport::tcp::connect(addr).await?);
    let bob = Arc::new(relayhub::transport::tcp::connect(addr).await?);

    // Wait until both connections have joined before broadcasting.
    let mut joined = 0;
    while joined < 2 {
        if let HubEvent::Connected { identity, kind } = events.recv().await? {
            println!("connected {identity} over {}", kind.as_str());
            joined += 1;
        }
    }

    let mut alice_reader = FrameReader::new(Arc::clone(&alice));
    let mut bob_reader = FrameReader::new(Arc::clone(&bob));

    let mut hello = Message::new("HELLO".parse()?, BROADCAST, "is anyone there?");
    FrameWriter::new(Arc::clone(&alice))
        .write_message(&mut hello)
        .await?;

    let mut heard = bob_reader.read_message().await?;
    println!(
        "bob heard {} on channel {}: {:?}",
        heard.verb,
        heard.channel,
        String::from_utf8_lossy(&heard.content.to_bytes().await?)
    );

    // The channel a broadcast arrives on leads back to its sender.
    let mut reply = Message::new("REPLY".parse()?, heard.channel, "bob here");
    FrameWriter::new(Arc::clone(&bob))
        .write_message(&mut reply)
        .await?;

    let mut answer = alice_reader.read_message().await?;
    println!(
        "alice got {} on channel {}: {:?}",
        answer.verb,
        answer.channel,
        String::from_utf8_lossy(&answer.content.to_bytes().await?)
    );

    alice.dispose().await;
    bob.dispose().await;
    shutdown.cancel();
    server.await??;
    service.shutdown().await;
    Ok(())
}
