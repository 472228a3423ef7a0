//! Handler module - inbound call handling and dispatch.
//!
//! Provides:
//! - [`Handler`] - an async callback bound to a subscription pattern
//! - [`CallbackRegistry`] - pattern to rotating handler list
//! - [`Outcome`] - how a handler finishes a call: reply, return now, or forward
//!
//! # Example
//!
//! ```ignore
//! use servlink::handler::{Forward, Outcome};
//!
//! session
//!     .subscribe("ping/get", |_session, _request| {
//!         Box::pin(async move { Ok(Outcome::reply("pong")) })
//!     })
//!     .await?;
//!
//! session
//!     .subscribe("proxy/get", |_session, request| {
//!         Box::pin(async move { Ok(Outcome::forward("/backend/get", &request)) })
//!     })
//!     .await?;
//! ```

pub(crate) mod dispatch;
mod outcome;
mod registry;

pub use outcome::{Forward, Outcome, Response};
pub use registry::{BoxFuture, CallbackRegistry, Handler, HandlerResult};
