//! Callback registry for dispatching calls by subscription pattern.
//!
//! Each full pattern (service prefix + suffix) owns an ordered list of
//! handlers. Subscribing the same pattern again appends to the list, and
//! every dispatch rotates it: the front handler runs and moves to the back,
//! so repeated calls cycle through the handlers in subscription order.
//!
//! # Example
//!
//! ```ignore
//! use servlink::handler::CallbackRegistry;
//!
//! let mut registry = CallbackRegistry::new();
//! registry.subscribe("/svc/ping/get".to_string(), handler_a);
//! registry.subscribe("/svc/ping/get".to_string(), handler_b);
//!
//! let first = registry.rotate("/svc/ping/get"); // handler_a
//! let second = registry.rotate("/svc/ping/get"); // handler_b
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use super::Outcome;
use crate::error::Result;
use crate::protocol::Request;
use crate::session::Session;

/// Result type for handler functions.
pub type HandlerResult = Result<Outcome>;

/// Boxed future for handler results.
///
/// Not `Send`: handlers run on the session's own thread and borrow it.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Trait for handler functions.
///
/// A handler receives the session it was dispatched from, so it can issue
/// nested calls (`send_sync`, `recv_async`, ...) before it finishes.
pub trait Handler<S>: 'static {
    /// Handle one inbound call.
    fn call<'a>(&'a self, session: &'a mut Session<S>, request: Request)
        -> BoxFuture<'a, HandlerResult>;
}

impl<S, F> Handler<S> for F
where
    F: for<'a> Fn(&'a mut Session<S>, Request) -> BoxFuture<'a, HandlerResult> + 'static,
{
    fn call<'a>(
        &'a self,
        session: &'a mut Session<S>,
        request: Request,
    ) -> BoxFuture<'a, HandlerResult> {
        (self)(session, request)
    }
}

/// Registry mapping full patterns to their rotating handler lists.
pub struct CallbackRegistry<S> {
    callbacks: HashMap<String, VecDeque<Rc<dyn Handler<S>>>>,
}

impl<S> CallbackRegistry<S> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            callbacks: HashMap::new(),
        }
    }

    /// Append a handler to the list for `pattern`.
    pub fn subscribe(&mut self, pattern: String, handler: Rc<dyn Handler<S>>) {
        self.callbacks.entry(pattern).or_default().push_back(handler);
    }

    /// Remove every handler for `pattern`.
    ///
    /// Returns `false` if nothing was subscribed.
    pub fn unsubscribe(&mut self, pattern: &str) -> bool {
        self.callbacks.remove(pattern).is_some()
    }

    /// Take the next handler for `pattern`.
    ///
    /// The handler moves to the back of the list and stays registered, so a
    /// handler that is still running can be selected again by a nested
    /// dispatch.
    pub fn rotate(&mut self, pattern: &str) -> Option<Rc<dyn Handler<S>>> {
        let handlers = self.callbacks.get_mut(pattern)?;
        let handler = handlers.pop_front()?;
        handlers.push_back(Rc::clone(&handler));
        Some(handler)
    }

    /// Check whether `pattern` has any handler.
    pub fn contains(&self, pattern: &str) -> bool {
        self.callbacks.contains_key(pattern)
    }

    /// Number of handlers subscribed under `pattern`.
    pub fn handler_count(&self, pattern: &str) -> usize {
        self.callbacks.get(pattern).map_or(0, VecDeque::len)
    }

    /// Iterate over the subscribed patterns.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.callbacks.keys().map(String::as_str)
    }

    /// Number of subscribed patterns.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Check if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<S> Default for CallbackRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}
