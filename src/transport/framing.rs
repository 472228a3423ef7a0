//! Frame-level reads and writes over the duplex channel.
//!
//! Two strategies are supported:
//!
//! - [`Framing::Framed`]: every payload carries a 4-byte Big Endian length
//!   prefix. Boundaries are exact.
//! - [`Framing::Chunked`]: no prefix. A frame ends when a read returns fewer
//!   bytes than the chunk size, or when nothing more is immediately readable.
//!   A payload that exactly fills a whole number of chunks, or one delivered
//!   by the peer in several writes, can be split or merged incorrectly; use
//!   it only with runtimes that cannot frame.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::Poll;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::error::Result;
use crate::protocol::{FrameBuffer, FRAME_HEADER_SIZE};

/// Default read size for framed channels.
pub const DEFAULT_READ_SIZE: usize = 64 * 1024;

/// How frame boundaries are found on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// 4-byte Big Endian length prefix on every frame.
    #[default]
    Framed,
    /// Unprefixed; frames end on a short or exhausted chunk read.
    Chunked {
        /// Size of each read.
        chunk_size: usize,
    },
}

/// Owns the channel and turns its byte stream into frames.
pub struct Transport<S> {
    stream: S,
    framing: Framing,
    frames: FrameBuffer,
    ready: VecDeque<Bytes>,
    read_buf: Vec<u8>,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(stream: S, framing: Framing) -> Self {
        let read_size = match framing {
            Framing::Framed => DEFAULT_READ_SIZE,
            Framing::Chunked { chunk_size } => {
                tracing::warn!(
                    chunk_size,
                    "chunked framing selected; frame boundaries depend on chunk size"
                );
                chunk_size.max(1)
            }
        };

        Self {
            stream,
            framing,
            frames: FrameBuffer::new(),
            ready: VecDeque::new(),
            read_buf: vec![0u8; read_size],
        }
    }

    /// Replace the frame buffer, e.g. to lower the maximum frame size.
    pub fn with_frame_buffer(mut self, frames: FrameBuffer) -> Self {
        self.frames = frames;
        self
    }

    /// The framing strategy in use.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Write one payload as a frame and flush.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.framing == Framing::Framed {
            let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
            buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            buf.extend_from_slice(payload);
            self.stream.write_all(&buf).await?;
        } else {
            self.stream.write_all(payload).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait for the next complete frame.
    ///
    /// Returns `Ok(None)` once the channel is closed or a read fails.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        match self.framing {
            Framing::Framed => self.recv_framed().await,
            Framing::Chunked { .. } => Ok(self.recv_chunked().await),
        }
    }

    async fn recv_framed(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let n = match self.read_some().await {
                Some(n) => n,
                None => return Ok(None),
            };
            let frames = self.frames.push(&self.read_buf[..n])?;
            self.ready.extend(frames);
        }
    }

    async fn recv_chunked(&mut self) -> Option<Bytes> {
        let n = self.read_some().await?;
        let chunk_size = self.read_buf.len();
        let mut data = BytesMut::from(&self.read_buf[..n]);

        let mut full = n == chunk_size;
        while full {
            match read_now(&mut self.stream, &mut self.read_buf).await {
                Some(Ok(n)) if n > 0 => {
                    data.extend_from_slice(&self.read_buf[..n]);
                    full = n == chunk_size;
                }
                // Nothing buffered right now, or the channel closed; a
                // close is reported by the next recv.
                _ => break,
            }
        }

        Some(data.freeze())
    }

    async fn read_some(&mut self) -> Option<usize> {
        match self.stream.read(&mut self.read_buf).await {
            Ok(0) => {
                tracing::debug!("channel closed by peer");
                None
            }
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("channel read failed: {}", e);
                None
            }
        }
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Get a mutable reference to the underlying stream.
    ///
    /// Reading from it directly desynchronizes buffered frames.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consume the transport, returning the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Read whatever is available right now without waiting.
///
/// Returns `None` if the read would block.
async fn read_now<R>(reader: &mut R, buf: &mut [u8]) -> Option<io::Result<usize>>
where
    R: AsyncRead + Unpin,
{
    let mut read_buf = ReadBuf::new(buf);
    poll_fn(|cx| match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
        Poll::Ready(Ok(())) => Poll::Ready(Some(Ok(read_buf.filled().len()))),
        Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
        Poll::Pending => Poll::Ready(None),
    })
    .await
}
