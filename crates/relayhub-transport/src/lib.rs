//! Duplex byte transport abstraction.
//!
//! A transport is the thinnest possible surface a frame stream needs:
//! - `pull` a chunk of bytes (0 means end of input)
//! - `push` a chunk of bytes (0 means the sink is closed)
//! - `is_alive` / `dispose` for lifecycle
//!
//! This is the lowest layer of relayhub. Every concrete socket kind is
//! adapted through [`StreamTransport`], so frame parsing is shared.

pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use tcp::TcpSocketListener;
pub use traits::{StreamTransport, Transport, TransportKind};

#[cfg(unix)]
pub use uds::UnixSocketListener;
