//! Wire format primitives.
//!
//! Every message starts with a 4-byte tag followed by tag-specific fields:
//! ```text
//! string  │ u32 size (incl. NUL) │ bytes … 0x00 │
//! blob    │ u32 size             │ bytes        │ 0x00 │
//! trans id│ 16 bytes                                   │
//! pid     │ u32 size             │ bytes        │
//! ```
//!
//! Field integers use the host's native byte order; the runtime shares the
//! host with the worker. Only the outer frame length (see
//! [`FrameBuffer`](super::FrameBuffer)) is Big Endian.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, ServlinkError};

/// Frame length prefix size in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum frame size (1 GB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1_073_741_824;

/// Size of a transaction id in bytes.
pub const TRANS_ID_SIZE: usize = 16;

/// Message tags.
pub mod tags {
    pub const INIT: u32 = 1;
    pub const SEND_ASYNC: u32 = 2;
    pub const SEND_SYNC: u32 = 3;
    pub const RECV_ASYNC: u32 = 4;
    pub const RETURN_ASYNC: u32 = 5;
    pub const RETURN_SYNC: u32 = 6;
    /// Inbound only.
    pub const RETURNS_ASYNC: u32 = 7;
    /// Outbound only; shares the value of `RETURNS_ASYNC`.
    pub const MCAST_ASYNC: u32 = 7;
    pub const KEEPALIVE: u32 = 8;
    pub const SUBSCRIBE: u32 = 9;
    pub const UNSUBSCRIBE: u32 = 10;
    pub const FORWARD_ASYNC: u32 = 11;
    pub const FORWARD_SYNC: u32 = 12;
}

/// Whether a call expects an asynchronous or synchronous reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Async,
    Sync,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Async => f.write_str("async"),
            CallKind::Sync => f.write_str("sync"),
        }
    }
}

/// 16-byte transaction id correlating a request with its reply.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransId(pub [u8; TRANS_ID_SIZE]);

impl TransId {
    /// The all-zero id, meaning "any transaction" for `recv_async`.
    pub const NULL: TransId = TransId([0; TRANS_ID_SIZE]);

    /// Create from raw bytes.
    pub fn new(bytes: [u8; TRANS_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; TRANS_ID_SIZE] {
        &self.0
    }

    /// Check if this is the all-zero id.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == [0; TRANS_ID_SIZE]
    }
}

impl fmt::Debug for TransId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransId(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl From<[u8; TRANS_ID_SIZE]> for TransId {
    fn from(bytes: [u8; TRANS_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Sequential reader over a message body.
///
/// Every accessor checks the remaining length first, so a short buffer
/// surfaces as a protocol error instead of a panic.
pub(crate) struct FieldReader<'a> {
    buf: &'a mut Bytes,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a mut Bytes) -> Self {
        Self { buf }
    }

    fn require(&self, n: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(ServlinkError::Protocol(format!(
                "truncated {}: need {} bytes, have {}",
                what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        self.require(4, what)?;
        Ok(self.buf.get_u32_ne())
    }

    pub(crate) fn i8(&mut self, what: &str) -> Result<i8> {
        self.require(1, what)?;
        Ok(self.buf.get_i8())
    }

    fn take(&mut self, n: usize, what: &str) -> Result<Bytes> {
        self.require(n, what)?;
        Ok(self.buf.split_to(n))
    }

    /// NUL-terminated string; the size includes the terminator.
    pub(crate) fn string(&mut self, what: &str) -> Result<String> {
        let size = self.u32(what)? as usize;
        let raw = self.take(size, what)?;
        match raw.split_last() {
            Some((&0, text)) => String::from_utf8(text.to_vec())
                .map_err(|_| ServlinkError::Protocol(format!("{} is not valid UTF-8", what))),
            _ => Err(ServlinkError::Protocol(format!(
                "{} is not NUL-terminated",
                what
            ))),
        }
    }

    /// Length-prefixed byte string followed by one pad byte.
    pub(crate) fn blob(&mut self, what: &str) -> Result<Bytes> {
        let size = self.u32(what)? as usize;
        let data = self.take(size, what)?;
        self.require(1, what)?;
        self.buf.advance(1);
        Ok(data)
    }

    pub(crate) fn trans_id(&mut self) -> Result<TransId> {
        self.require(TRANS_ID_SIZE, "trans_id")?;
        let mut id = [0u8; TRANS_ID_SIZE];
        self.buf.copy_to_slice(&mut id);
        Ok(TransId(id))
    }

    /// Opaque sender reference, copied through unchanged.
    pub(crate) fn pid(&mut self) -> Result<Bytes> {
        let size = self.u32("pid")? as usize;
        self.take(size, "pid")
    }
}

/// Append-only writer mirroring [`FieldReader`].
pub(crate) struct FieldWriter {
    buf: BytesMut,
}

impl FieldWriter {
    pub(crate) fn new(tag: u32) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u32_ne(tag);
        Self { buf }
    }

    pub(crate) fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_ne(value);
        self
    }

    pub(crate) fn i8(&mut self, value: i8) -> &mut Self {
        self.buf.put_i8(value);
        self
    }

    pub(crate) fn string(&mut self, value: &str) -> &mut Self {
        self.buf.put_u32_ne(value.len() as u32 + 1);
        self.buf.put_slice(value.as_bytes());
        self.buf.put_u8(0);
        self
    }

    pub(crate) fn blob(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_u32_ne(value.len() as u32);
        self.buf.put_slice(value);
        self.buf.put_u8(0);
        self
    }

    pub(crate) fn trans_id(&mut self, value: &TransId) -> &mut Self {
        self.buf.put_slice(value.as_bytes());
        self
    }

    pub(crate) fn pid(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_u32_ne(value.len() as u32);
        self.buf.put_slice(value);
        self
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
