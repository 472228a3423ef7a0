//! Transport module - channel ownership and framing.
//!
//! Provides:
//! - [`Transport`] - frame reads/writes under a [`Framing`] strategy
//! - [`Channel`] - the inherited socket descriptor of a worker thread

mod channel;
mod framing;

pub use channel::{Channel, SocketKind, FIRST_CHANNEL_FD};
pub use framing::{Framing, Transport, DEFAULT_READ_SIZE};
