//! Message hub with identity-relative addressing.
//!
//! Peers connect over TCP, Unix sockets or any byte stream and exchange
//! `<verb> <channel> <count> <content>` frames. The hub resolves each
//! channel relative to the sender's private identity, which gives
//! broadcast, reply-to-sender and point-to-point addressing without a
//! session table.
//!
//! # Crate Structure
//!
//! - [`transport`]: the pull/push transport contract and socket adapters
//! - [`frame`]: field grammar, incremental frame reader and writer
//! - [`hub`]: routing engine and service lifecycle (behind `hub` feature)

/// Re-export transport types.
pub mod transport {
    pub use relayhub_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use relayhub_frame::*;
}

/// Re-export hub types (requires `hub` feature).
#[cfg(feature = "hub")]
pub mod hub {
    pub use relayhub_hub::*;
}
