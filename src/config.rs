//! Startup configuration.
//!
//! The supervisor describes the inherited channels through environment
//! variables, read once when the worker starts:
//!
//! | Variable                | Meaning                                   |
//! |-------------------------|-------------------------------------------|
//! | `SERVLINK_PROTOCOL`     | `tcp`, `local` or `udp`                   |
//! | `SERVLINK_BUFFER_SIZE`  | read size in bytes, > 0                   |
//! | `SERVLINK_THREAD_COUNT` | number of worker threads (channels), > 0  |
//!
//! `tcp` channels are length-prefixed ([`Framing::Framed`]); `local` and
//! `udp` channels are unprefixed and read in chunks of the buffer size.
//!
//! # Example
//!
//! ```
//! use servlink::config::{Config, Protocol};
//! use servlink::transport::Framing;
//!
//! let config = Config::from_vars(|name| match name {
//!     "SERVLINK_PROTOCOL" => Some("tcp".to_string()),
//!     "SERVLINK_BUFFER_SIZE" => Some("65536".to_string()),
//!     "SERVLINK_THREAD_COUNT" => Some("4".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! assert_eq!(config.protocol, Protocol::Tcp);
//! assert_eq!(config.framing(), Framing::Framed);
//! assert_eq!(config.thread_count, 4);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ServlinkError};
use crate::protocol::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::{Framing, SocketKind, DEFAULT_READ_SIZE};

/// Environment variable naming the channel protocol.
pub const ENV_PROTOCOL: &str = "SERVLINK_PROTOCOL";
/// Environment variable holding the read buffer size.
pub const ENV_BUFFER_SIZE: &str = "SERVLINK_BUFFER_SIZE";
/// Environment variable holding the worker thread count.
pub const ENV_THREAD_COUNT: &str = "SERVLINK_THREAD_COUNT";

/// Transport protocol of the inherited channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Local,
    Udp,
}

impl Protocol {
    /// Socket family to open the descriptor as.
    pub fn socket_kind(self) -> SocketKind {
        match self {
            Protocol::Tcp => SocketKind::Tcp,
            Protocol::Local => SocketKind::Local,
            Protocol::Udp => SocketKind::Udp,
        }
    }
}

impl FromStr for Protocol {
    type Err = ServlinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "local" => Ok(Protocol::Local),
            "udp" => Ok(Protocol::Udp),
            other => Err(ServlinkError::InvalidConfiguration(format!(
                "{} must be tcp, local or udp, got {:?}",
                ENV_PROTOCOL, other
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Local => "local",
            Protocol::Udp => "udp",
        })
    }
}

/// Worker startup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub protocol: Protocol,
    /// Read size; also the chunk size for unprefixed channels.
    pub buffer_size: usize,
    /// Number of worker threads, one channel each.
    pub thread_count: u32,
    /// Largest accepted length-prefixed frame.
    pub max_frame_size: u32,
}

impl Config {
    /// Create a configuration with default sizes and one thread.
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            buffer_size: DEFAULT_READ_SIZE,
            thread_count: 1,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let protocol: Protocol = required(&lookup, ENV_PROTOCOL)?.parse()?;
        let buffer_size: usize = positive(&lookup, ENV_BUFFER_SIZE)?;
        let thread_count: u32 = positive(&lookup, ENV_THREAD_COUNT)?;

        tracing::debug!(%protocol, buffer_size, thread_count, "configuration loaded");

        Ok(Self::new(protocol)
            .with_buffer_size(buffer_size)
            .with_thread_count(thread_count))
    }

    /// Set the read buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the worker thread count.
    pub fn with_thread_count(mut self, count: u32) -> Self {
        self.thread_count = count;
        self
    }

    /// Set the largest accepted frame.
    ///
    /// Default: 1 GiB
    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Framing strategy implied by the protocol.
    pub fn framing(&self) -> Framing {
        match self.protocol {
            Protocol::Tcp => Framing::Framed,
            Protocol::Local | Protocol::Udp => Framing::Chunked {
                chunk_size: self.buffer_size,
            },
        }
    }

    /// Socket family implied by the protocol.
    pub fn socket_kind(&self) -> SocketKind {
        self.protocol.socket_kind()
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or_else(|| ServlinkError::InvalidConfiguration(format!("{} is not set", name)))
}

fn positive<F, T>(lookup: &F, name: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
{
    let raw = required(lookup, name)?;
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(ServlinkError::InvalidConfiguration(format!(
            "{} must be a positive integer, got {:?}",
            name, raw
        ))),
    }
}
