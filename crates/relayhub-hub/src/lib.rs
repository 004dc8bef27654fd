//! Identity-relative message routing.
//!
//! Every connection gets a private random [`Identity`]. Channels on the
//! wire are always relative to the sender:
//! - `0` routes back to the sender
//! - `-1` broadcasts to everyone else, each recipient seeing the channel
//!   `id(sender) ^ id(recipient)`
//! - any other value `c` routes to `id(sender) ^ c`, if that connection is
//!   live, and is dropped otherwise
//!
//! Replying on the channel a broadcast arrived on therefore reaches the
//! broadcaster, without any table of who is connected as whom.

pub mod error;
pub mod events;
pub mod hub;
pub mod identity;
pub mod listener;
pub mod rate_limit;
pub mod service;
pub mod stream;

pub use error::{HubError, Result};
pub use events::{DisconnectReason, HubEvent};
pub use hub::{Hub, HubConfig, Route, Snapshot, DEFAULT_EVENT_CAPACITY};
pub use identity::Identity;
pub use listener::{serve, Acceptor};
pub use rate_limit::RateLimiter;
pub use service::HubService;
pub use stream::FrameStream;
