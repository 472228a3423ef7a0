//! Inherited channel descriptors.
//!
//! The supervisor starts the worker process with one connected socket per
//! worker thread already open: thread `i` owns descriptor `i + 3`. This
//! module wraps that descriptor as a tokio stream. UDP sockets are read one
//! datagram at a time, which pairs with chunked framing.
//!
//! # Example
//!
//! ```ignore
//! use servlink::transport::{Channel, SocketKind};
//!
//! // Inside a tokio runtime on worker thread 0:
//! let channel = unsafe { Channel::from_thread_index(0, SocketKind::Local)? };
//! ```

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// First inherited descriptor; thread `i` uses `FIRST_CHANNEL_FD + i`.
pub const FIRST_CHANNEL_FD: i32 = 3;

/// Socket family of the inherited descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Unix domain socket.
    Local,
    /// TCP socket.
    Tcp,
    /// Connected UDP socket; one datagram per read.
    Udp,
}

/// An inherited, connected channel.
#[derive(Debug)]
pub enum Channel {
    #[cfg(unix)]
    Local(tokio::net::UnixStream),
    Tcp(tokio::net::TcpStream),
    Udp(tokio::net::UdpSocket),
}

#[cfg(unix)]
mod unix_impl {
    use std::os::unix::io::{FromRawFd, RawFd};

    use super::*;

    impl Channel {
        /// Wrap the descriptor owned by worker thread `thread_index`.
        ///
        /// Must be called from within a tokio runtime.
        ///
        /// # Safety
        ///
        /// The descriptor must be an open, connected socket of the given kind
        /// that nothing else in the process owns or will close.
        pub unsafe fn from_thread_index(thread_index: u32, kind: SocketKind) -> io::Result<Self> {
            let fd = FIRST_CHANNEL_FD + thread_index as RawFd;
            Self::from_raw_fd(fd, kind)
        }

        /// Wrap an arbitrary descriptor.
        ///
        /// # Safety
        ///
        /// Same requirements as [`Channel::from_thread_index`].
        pub unsafe fn from_raw_fd(fd: RawFd, kind: SocketKind) -> io::Result<Self> {
            match kind {
                SocketKind::Local => {
                    let stream = std::os::unix::net::UnixStream::from_raw_fd(fd);
                    stream.set_nonblocking(true)?;
                    Ok(Channel::Local(tokio::net::UnixStream::from_std(stream)?))
                }
                SocketKind::Tcp => {
                    let stream = std::net::TcpStream::from_raw_fd(fd);
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    Ok(Channel::Tcp(tokio::net::TcpStream::from_std(stream)?))
                }
                SocketKind::Udp => {
                    let socket = std::net::UdpSocket::from_raw_fd(fd);
                    socket.set_nonblocking(true)?;
                    Ok(Channel::Udp(tokio::net::UdpSocket::from_std(socket)?))
                }
            }
        }
    }
}

impl AsyncRead for Channel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Channel::Local(s) => Pin::new(s).poll_read(cx, buf),
            Channel::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Channel::Udp(s) => s.poll_recv(cx, buf),
        }
    }
}

impl AsyncWrite for Channel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            #[cfg(unix)]
            Channel::Local(s) => Pin::new(s).poll_write(cx, buf),
            Channel::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Channel::Udp(s) => s.poll_send(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Channel::Local(s) => Pin::new(s).poll_flush(cx),
            Channel::Tcp(s) => Pin::new(s).poll_flush(cx),
            Channel::Udp(_) => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            #[cfg(unix)]
            Channel::Local(s) => Pin::new(s).poll_shutdown(cx),
            Channel::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Channel::Udp(_) => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::io::IntoRawFd;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn test_local_channel_from_raw_fd() {
        let (ours, theirs) = std::os::unix::net::UnixStream::pair().unwrap();
        let fd = ours.into_raw_fd();

        let mut channel = unsafe { Channel::from_raw_fd(fd, SocketKind::Local) }.unwrap();
        theirs.set_nonblocking(true).unwrap();
        let mut peer = tokio::net::UnixStream::from_std(theirs).unwrap();

        channel.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").await.unwrap();
        channel.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn test_tcp_channel_from_raw_fd() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = std::net::TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let fd = client.into_raw_fd();
        let mut channel = unsafe { Channel::from_raw_fd(fd, SocketKind::Tcp) }.unwrap();

        channel.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_udp_channel_one_datagram_per_read() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.connect(peer.local_addr().unwrap()).unwrap();
        peer.connect(socket.local_addr().unwrap()).await.unwrap();

        let fd = socket.into_raw_fd();
        let mut channel = unsafe { Channel::from_raw_fd(fd, SocketKind::Udp) }.unwrap();

        channel.write_all(b"datagram").await.unwrap();
        let mut buf = [0u8; 64];
        let n = peer.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"datagram");

        peer.send(b"one").await.unwrap();
        peer.send(b"two").await.unwrap();
        let n = channel.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"one");
    }
}
