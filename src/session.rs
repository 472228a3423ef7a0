//! Worker session and poll loop.
//!
//! A [`Session`] owns one channel to the runtime. Its lifecycle:
//! 1. Send `Init` and wait for the runtime's `Init` with the session defaults
//! 2. Subscribe handlers to patterns
//! 3. Poll: dispatch inbound calls, answer keepalives, and stop at the first
//!    terminal reply or when the channel closes
//!
//! Outgoing requests (`send_async`, `send_sync`, ...) write their message and
//! then poll until the runtime's answer arrives, serving any inbound calls
//! that come first. Handlers receive the session and may issue such requests
//! themselves.
//!
//! # Example
//!
//! ```no_run
//! use servlink::{Framing, Outcome, Session};
//!
//! # async fn run(stream: tokio::net::TcpStream) -> servlink::Result<()> {
//! let mut session = Session::connect(stream, Framing::Framed).await?;
//!
//! session
//!     .subscribe("ping/get", |_session, _request| {
//!         Box::pin(async move { Ok(Outcome::reply("pong")) })
//!     })
//!     .await?;
//!
//! // Serve calls until the runtime closes the channel.
//! while session.poll().await?.is_some() {}
//! # Ok(())
//! # }
//! ```

use std::rc::Rc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, ServlinkError};
use crate::handler::dispatch::dispatch;
use crate::handler::{BoxFuture, CallbackRegistry, Handler, HandlerResult};
use crate::protocol::{
    CallKind, ForwardMessage, Inbound, Outbound, RecvResult, Request, ReturnMessage, SendMessage,
    SessionConfig, TransId,
};
use crate::transport::{Framing, Transport};

/// Terminal reply that ended a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Transaction id of an accepted `send_async`.
    ReturnAsync(TransId),
    /// Result of a `recv_async`.
    RecvAsync(RecvResult),
    /// Result of a `send_sync`.
    ReturnSync(RecvResult),
    /// Transaction ids of an accepted `mcast_async`.
    ReturnsAsync(Vec<TransId>),
}

impl Reply {
    fn name(&self) -> &'static str {
        match self {
            Reply::ReturnAsync(_) => "ReturnAsync",
            Reply::RecvAsync(_) => "RecvAsync",
            Reply::ReturnSync(_) => "ReturnSync",
            Reply::ReturnsAsync(_) => "ReturnsAsync",
        }
    }
}

/// Optional overrides for an outgoing request.
///
/// Unset fields take the session defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub timeout: Option<u32>,
    pub request_info: Option<Bytes>,
    pub priority: Option<i8>,
}

impl SendOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout in milliseconds.
    pub fn timeout(mut self, timeout: u32) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the request info payload.
    pub fn request_info(mut self, info: impl Into<Bytes>) -> Self {
        self.request_info = Some(info.into());
        self
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i8) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// A ready session with the runtime.
pub struct Session<S> {
    transport: Transport<S>,
    config: SessionConfig,
    pub(crate) callbacks: CallbackRegistry<S>,
    /// Set once a session operation fails; the channel is then unusable.
    failed: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + 'static,
{
    /// Perform the handshake on a connected stream.
    pub async fn connect(stream: S, framing: Framing) -> Result<Self> {
        Self::handshake(Transport::new(stream, framing)).await
    }

    /// Perform the handshake on an existing transport.
    ///
    /// Sends `Init`, then expects the runtime's `Init` as the very next frame.
    pub async fn handshake(mut transport: Transport<S>) -> Result<Self> {
        transport.send(&Outbound::Init.encode()).await?;

        let frame = transport
            .recv()
            .await?
            .ok_or(ServlinkError::ConnectionClosed)?;

        match Inbound::decode(frame)? {
            Inbound::Init(config) => {
                tracing::debug!(
                    prefix = %config.prefix,
                    timeout_async = config.timeout_async,
                    timeout_sync = config.timeout_sync,
                    "session ready"
                );
                Ok(Self {
                    transport,
                    config,
                    callbacks: CallbackRegistry::new(),
                    failed: false,
                })
            }
            other => Err(ServlinkError::Protocol(format!(
                "expected Init, got message tag {}",
                other.tag()
            ))),
        }
    }

    /// Service prefix prepended to subscribed patterns.
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Default timeout for async requests (milliseconds).
    pub fn timeout_async(&self) -> u32 {
        self.config.timeout_async
    }

    /// Default timeout for sync requests (milliseconds).
    pub fn timeout_sync(&self) -> u32 {
        self.config.timeout_sync
    }

    /// Default request priority.
    pub fn priority_default(&self) -> i8 {
        self.config.priority_default
    }

    /// All defaults received during the handshake.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registered handlers, keyed by full pattern.
    pub fn callbacks(&self) -> &CallbackRegistry<S> {
        &self.callbacks
    }

    /// Register `handler` for `prefix + pattern`.
    ///
    /// Subscribing a pattern again adds another handler; calls rotate through
    /// them in subscription order.
    pub async fn subscribe<F>(&mut self, pattern: &str, handler: F) -> Result<()>
    where
        F: for<'a> Fn(&'a mut Session<S>, Request) -> BoxFuture<'a, HandlerResult> + 'static,
    {
        self.subscribe_handler(pattern, Rc::new(handler)).await
    }

    /// Register an already shared handler for `prefix + pattern`.
    pub async fn subscribe_handler(
        &mut self,
        pattern: &str,
        handler: Rc<dyn Handler<S>>,
    ) -> Result<()> {
        let key = format!("{}{}", self.config.prefix, pattern);
        tracing::debug!(pattern = %key, "subscribe");
        self.callbacks.subscribe(key, handler);
        self.send_message(&Outbound::Subscribe(pattern.to_string()))
            .await
    }

    /// Remove every handler for `prefix + pattern`.
    ///
    /// Does nothing if the pattern is not subscribed.
    pub async fn unsubscribe(&mut self, pattern: &str) -> Result<()> {
        let key = format!("{}{}", self.config.prefix, pattern);
        if !self.callbacks.unsubscribe(&key) {
            tracing::debug!(pattern = %key, "unsubscribe of unknown pattern ignored");
            return Ok(());
        }
        tracing::debug!(pattern = %key, "unsubscribe");
        self.send_message(&Outbound::Unsubscribe(pattern.to_string()))
            .await
    }

    /// Send an async request with default options.
    ///
    /// Returns `None` if the channel closed before the runtime answered.
    pub async fn send_async(
        &mut self,
        name: &str,
        request: impl Into<Bytes>,
    ) -> Result<Option<TransId>> {
        self.send_async_with(name, request, SendOptions::default())
            .await
    }

    /// Send an async request.
    pub async fn send_async_with(
        &mut self,
        name: &str,
        request: impl Into<Bytes>,
        options: SendOptions,
    ) -> Result<Option<TransId>> {
        let message = self.build_send(name, request.into(), options, self.config.timeout_async);
        self.send_message(&Outbound::Send(CallKind::Async, message))
            .await?;

        match self.poll().await? {
            None => Ok(None),
            Some(Reply::ReturnAsync(trans_id)) => Ok(Some(trans_id)),
            Some(other) => Err(self.fail(unexpected_reply("send_async", &other))),
        }
    }

    /// Send a sync request with default options and wait for its response.
    pub async fn send_sync(
        &mut self,
        name: &str,
        request: impl Into<Bytes>,
    ) -> Result<Option<RecvResult>> {
        self.send_sync_with(name, request, SendOptions::default())
            .await
    }

    /// Send a sync request and wait for its response.
    pub async fn send_sync_with(
        &mut self,
        name: &str,
        request: impl Into<Bytes>,
        options: SendOptions,
    ) -> Result<Option<RecvResult>> {
        let message = self.build_send(name, request.into(), options, self.config.timeout_sync);
        self.send_message(&Outbound::Send(CallKind::Sync, message))
            .await?;

        match self.poll().await? {
            None => Ok(None),
            Some(Reply::ReturnSync(result)) => Ok(Some(result)),
            Some(other) => Err(self.fail(unexpected_reply("send_sync", &other))),
        }
    }

    /// Send an async request to every subscriber of `name`.
    pub async fn mcast_async(
        &mut self,
        name: &str,
        request: impl Into<Bytes>,
    ) -> Result<Option<Vec<TransId>>> {
        self.mcast_async_with(name, request, SendOptions::default())
            .await
    }

    /// Send an async request to every subscriber of `name`, with options.
    pub async fn mcast_async_with(
        &mut self,
        name: &str,
        request: impl Into<Bytes>,
        options: SendOptions,
    ) -> Result<Option<Vec<TransId>>> {
        let message = self.build_send(name, request.into(), options, self.config.timeout_async);
        self.send_message(&Outbound::McastAsync(message)).await?;

        match self.poll().await? {
            None => Ok(None),
            Some(Reply::ReturnsAsync(trans_ids)) => Ok(Some(trans_ids)),
            Some(other) => Err(self.fail(unexpected_reply("mcast_async", &other))),
        }
    }

    /// Receive the response of an earlier async request.
    ///
    /// `timeout` defaults to the sync timeout. A missing `trans_id` (sent as
    /// all zeros) takes whichever response is available first.
    pub async fn recv_async(
        &mut self,
        timeout: Option<u32>,
        trans_id: Option<TransId>,
    ) -> Result<Option<RecvResult>> {
        let message = Outbound::RecvAsync {
            timeout: timeout.unwrap_or(self.config.timeout_sync),
            trans_id: trans_id.unwrap_or(TransId::NULL),
        };
        self.send_message(&message).await?;

        match self.poll().await? {
            None => Ok(None),
            Some(Reply::RecvAsync(result)) => Ok(Some(result)),
            Some(other) => Err(self.fail(unexpected_reply("recv_async", &other))),
        }
    }

    /// Forward an async call without going through a handler outcome.
    pub async fn forward_async(&mut self, message: ForwardMessage) -> Result<()> {
        self.send_message(&Outbound::Forward(CallKind::Async, message))
            .await
    }

    /// Forward a sync call without going through a handler outcome.
    pub async fn forward_sync(&mut self, message: ForwardMessage) -> Result<()> {
        self.send_message(&Outbound::Forward(CallKind::Sync, message))
            .await
    }

    /// Answer an async call without going through a handler outcome.
    pub async fn return_async(&mut self, message: ReturnMessage) -> Result<()> {
        self.send_message(&Outbound::Return(CallKind::Async, message))
            .await
    }

    /// Answer a sync call without going through a handler outcome.
    pub async fn return_sync(&mut self, message: ReturnMessage) -> Result<()> {
        self.send_message(&Outbound::Return(CallKind::Sync, message))
            .await
    }

    /// Serve the channel until a terminal reply arrives.
    ///
    /// Inbound calls are dispatched and keepalives answered along the way.
    /// Returns `Ok(None)` once the channel is closed.
    pub async fn poll(&mut self) -> Result<Option<Reply>> {
        let result = self.serve().await;
        self.track(result)
    }

    async fn serve(&mut self) -> Result<Option<Reply>> {
        loop {
            let mut frame = match self.transport.recv().await? {
                Some(frame) => frame,
                None => return Ok(None),
            };

            while !frame.is_empty() {
                match Inbound::decode_prefix(&mut frame)? {
                    Inbound::Send(request) => dispatch(self, request).await?,
                    Inbound::Keepalive => {
                        tracing::trace!("keepalive");
                        self.send_message(&Outbound::Keepalive).await?;
                    }
                    Inbound::Init(_) => {
                        return Err(ServlinkError::Protocol(
                            "Init received after handshake".to_string(),
                        ));
                    }
                    Inbound::ReturnAsync(trans_id) => {
                        return terminal(&frame, Reply::ReturnAsync(trans_id));
                    }
                    Inbound::RecvAsync(result) => {
                        return terminal(&frame, Reply::RecvAsync(result));
                    }
                    Inbound::ReturnSync(result) => {
                        return terminal(&frame, Reply::ReturnSync(result));
                    }
                    Inbound::ReturnsAsync(trans_ids) => {
                        return terminal(&frame, Reply::ReturnsAsync(trans_ids));
                    }
                }
            }
        }
    }

    /// Encode and write one message.
    pub(crate) async fn send_message(&mut self, message: &Outbound) -> Result<()> {
        let result = self.transport.send(&message.encode()).await;
        self.track(result)
    }

    /// Whether a session operation has failed.
    ///
    /// Errors raised by the session itself end it, even when they surface
    /// through a handler; any other handler error is answered and served past.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| self.fail(e))
    }

    fn fail(&mut self, err: ServlinkError) -> ServlinkError {
        self.failed = true;
        err
    }

    fn build_send(
        &self,
        name: &str,
        request: Bytes,
        options: SendOptions,
        default_timeout: u32,
    ) -> SendMessage {
        SendMessage {
            name: name.to_string(),
            request_info: options.request_info.unwrap_or_default(),
            request,
            timeout: options.timeout.unwrap_or(default_timeout),
            priority: options.priority.unwrap_or(self.config.priority_default),
        }
    }

    /// Consume the session, returning the stream.
    pub fn into_inner(self) -> S {
        self.transport.into_inner()
    }
}

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use crate::config::Config;
    use crate::protocol::FrameBuffer;
    use crate::transport::Channel;

    impl Session<Channel> {
        /// Open the inherited channel of worker thread `thread_index` and
        /// perform the handshake.
        ///
        /// Must be called from within a tokio runtime.
        ///
        /// # Safety
        ///
        /// The descriptor for `thread_index` must be an open, connected socket
        /// matching `config.protocol`, owned by nothing else in the process.
        /// Each thread index may be opened once.
        pub async unsafe fn open(config: &Config, thread_index: u32) -> Result<Self> {
            if thread_index >= config.thread_count {
                return Err(ServlinkError::InvalidConfiguration(format!(
                    "thread index {} out of range for {} threads",
                    thread_index, config.thread_count
                )));
            }

            let channel = Channel::from_thread_index(thread_index, config.socket_kind())?;
            let transport = Transport::new(channel, config.framing())
                .with_frame_buffer(FrameBuffer::with_max_frame(config.max_frame_size));

            Self::handshake(transport).await
        }
    }
}

fn terminal(rest: &Bytes, reply: Reply) -> Result<Option<Reply>> {
    if !rest.is_empty() {
        return Err(ServlinkError::Protocol(format!(
            "{} trailing bytes after {}",
            rest.len(),
            reply.name()
        )));
    }
    Ok(Some(reply))
}

fn unexpected_reply(operation: &str, reply: &Reply) -> ServlinkError {
    ServlinkError::Protocol(format!("{} answered with {}", operation, reply.name()))
}

#[cfg(test)]
mod tests {
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    use super::*;
    use crate::handler::Outcome;

    fn session_config() -> SessionConfig {
        SessionConfig {
            prefix: "/svc/".to_string(),
            timeout_async: 5000,
            timeout_sync: 3000,
            priority_default: 0,
        }
    }

    /// Connect a session; the runtime side gets a framed transport.
    async fn connected() -> (Session<DuplexStream>, Transport<DuplexStream>) {
        let (local, remote) = duplex(64 * 1024);
        let mut runtime = Transport::new(remote, Framing::Framed);
        runtime
            .send(&Inbound::Init(session_config()).encode())
            .await
            .unwrap();

        let session = Session::connect(local, Framing::Framed).await.unwrap();
        let init = runtime.recv().await.unwrap().unwrap();
        assert_eq!(Outbound::decode(init).unwrap(), Outbound::Init);
        (session, runtime)
    }

    async fn next_outbound(runtime: &mut Transport<DuplexStream>) -> Outbound {
        Outbound::decode(runtime.recv().await.unwrap().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_sets_defaults() {
        let (session, _runtime) = connected().await;

        assert_eq!(session.prefix(), "/svc/");
        assert_eq!(session.timeout_async(), 5000);
        assert_eq!(session.timeout_sync(), 3000);
        assert_eq!(session.priority_default(), 0);
        assert!(session.callbacks().is_empty());
    }

    #[tokio::test]
    async fn test_handshake_closed_channel() {
        let (local, mut remote) = duplex(1024);
        remote.shutdown().await.unwrap();

        let result = Session::connect(local, Framing::Framed).await;
        assert!(matches!(result, Err(ServlinkError::ConnectionClosed)));
        drop(remote);
    }

    #[tokio::test]
    async fn test_handshake_rejects_other_message() {
        let (local, remote) = duplex(1024);
        let mut runtime = Transport::new(remote, Framing::Framed);
        runtime.send(&Inbound::Keepalive.encode()).await.unwrap();

        let err = Session::connect(local, Framing::Framed).await.err().unwrap();
        assert!(matches!(err, ServlinkError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_subscribe_sends_suffix_only() {
        let (mut session, mut runtime) = connected().await;

        session
            .subscribe("ping/get", |_, _| {
                Box::pin(async { Ok(Outcome::reply("pong")) })
            })
            .await
            .unwrap();

        assert!(session.callbacks().contains("/svc/ping/get"));
        assert_eq!(
            next_outbound(&mut runtime).await,
            Outbound::Subscribe("ping/get".to_string())
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_writes_nothing() {
        let (mut session, mut runtime) = connected().await;

        session.unsubscribe("never/subscribed").await.unwrap();
        session.send_message(&Outbound::Keepalive).await.unwrap();

        assert_eq!(next_outbound(&mut runtime).await, Outbound::Keepalive);
    }

    #[tokio::test]
    async fn test_send_options_fill_defaults() {
        let (session, _runtime) = connected().await;

        let defaults = session.build_send("/a", Bytes::new(), SendOptions::new(), 5000);
        assert_eq!(defaults.timeout, 5000);
        assert_eq!(defaults.priority, 0);
        assert!(defaults.request_info.is_empty());

        let custom = session.build_send(
            "/a",
            Bytes::new(),
            SendOptions::new()
                .timeout(10)
                .priority(-3)
                .request_info("k\0v\0"),
            5000,
        );
        assert_eq!(custom.timeout, 10);
        assert_eq!(custom.priority, -3);
        assert_eq!(&custom.request_info[..], b"k\0v\0");
    }

    #[tokio::test]
    async fn test_recv_async_defaults() {
        let (mut session, mut runtime) = connected().await;

        let result = RecvResult {
            response_info: Bytes::new(),
            response: Bytes::from_static(b"late"),
            trans_id: TransId::new([4; 16]),
        };
        runtime
            .send(&Inbound::RecvAsync(result.clone()).encode())
            .await
            .unwrap();

        assert_eq!(session.recv_async(None, None).await.unwrap(), Some(result));
        assert_eq!(
            next_outbound(&mut runtime).await,
            Outbound::RecvAsync {
                timeout: 3000,
                trans_id: TransId::NULL
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_terminal_reply_is_protocol_error() {
        let (mut session, mut runtime) = connected().await;

        runtime
            .send(&Inbound::ReturnsAsync(vec![TransId::new([1; 16])]).encode())
            .await
            .unwrap();

        assert!(!session.is_failed());
        let err = session.send_sync("/other", "x").await.unwrap_err();
        assert!(matches!(err, ServlinkError::Protocol(_)));
        assert!(session.is_failed());
    }

    #[tokio::test]
    async fn test_terminal_with_trailing_bytes() {
        let (mut session, mut runtime) = connected().await;

        let mut frame = Inbound::ReturnAsync(TransId::new([2; 16])).encode().to_vec();
        frame.push(0);
        runtime.send(&frame).await.unwrap();

        assert!(session.poll().await.is_err());
        assert!(session.is_failed());
    }

    #[tokio::test]
    async fn test_poll_closed_channel_returns_none() {
        let (mut session, runtime) = connected().await;
        drop(runtime);

        assert_eq!(session.poll().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_signaling_return_writes_message() {
        let (mut session, mut runtime) = connected().await;

        let message = ReturnMessage {
            name: "/svc/a".to_string(),
            pattern: "/svc/a".to_string(),
            response_info: Bytes::new(),
            response: Bytes::from_static(b"done"),
            timeout: 100,
            trans_id: TransId::new([3; 16]),
            pid: Bytes::from_static(b"p"),
        };
        session.return_sync(message.clone()).await.unwrap();

        assert_eq!(
            next_outbound(&mut runtime).await,
            Outbound::Return(CallKind::Sync, message)
        );
    }
}
