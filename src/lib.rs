//! # servlink
//!
//! Worker-side engine for exchanging requests with an orchestration runtime.
//!
//! A supervisor starts the worker process with one connected socket per
//! worker thread already open. Each thread runs a [`Session`] on its socket:
//! it handshakes, subscribes handlers to name patterns, and serves inbound
//! calls while issuing its own requests to other services.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): binary message codec and frame buffer
//! - **Transport** ([`transport`]): length-prefixed or chunked framing over
//!   the inherited descriptor
//! - **Handlers** ([`handler`]): rotating callback registry and dispatch;
//!   handlers finish with an [`Outcome`] (reply, return now, or forward)
//! - **Session** ([`Session`]): handshake, poll loop, outgoing requests
//!
//! Sessions are single-threaded: run one per thread on a current-thread
//! tokio runtime.
//!
//! ## Example
//!
//! ```ignore
//! use servlink::{Config, Outcome, Session};
//!
//! let config = Config::from_env()?;
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_all()
//!     .build()?;
//!
//! runtime.block_on(async {
//!     let mut session = unsafe { Session::open(&config, 0) }.await?;
//!
//!     session
//!         .subscribe("echo/post", |_session, request| {
//!             Box::pin(async move { Ok(Outcome::reply(request.request)) })
//!         })
//!         .await?;
//!
//!     while session.poll().await?.is_some() {}
//!     Ok::<_, servlink::ServlinkError>(())
//! })?;
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod session;

pub use config::Config;
pub use error::{Result, ServlinkError};
pub use handler::{Forward, Outcome, Response};
pub use protocol::{CallKind, RecvResult, Request, TransId};
pub use session::{Reply, SendOptions, Session};
pub use transport::Framing;
