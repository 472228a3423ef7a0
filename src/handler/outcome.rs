//! Handler results.
//!
//! A handler ends every inbound call with exactly one [`Outcome`]:
//!
//! - [`Outcome::Reply`] - the normal result; the dispatcher answers with a
//!   return of the call's own kind.
//! - [`Outcome::Return`] - return immediately with an explicit kind.
//! - [`Outcome::Forward`] - hand the call to another destination instead of
//!   answering it.
//!
//! `Return` and `Forward` name a [`CallKind`]; it must match the call being
//! handled, otherwise the session fails with a protocol error.
//!
//! # Example
//!
//! ```
//! use servlink::handler::{Outcome, Response};
//!
//! let plain: Outcome = "pong".into();
//! let with_info: Outcome = ("status\0ok\0", "pong").into();
//! assert_eq!(plain, Outcome::Reply(Response::new("", "pong")));
//! assert!(matches!(with_info, Outcome::Reply(_)));
//! ```

use bytes::Bytes;

use crate::protocol::{CallKind, ForwardMessage, Request, ReturnMessage};

/// Response info and body sent back to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub info: Bytes,
    pub body: Bytes,
}

impl Response {
    /// Create from info and body.
    pub fn new(info: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            info: info.into(),
            body: body.into(),
        }
    }

    /// Body only, with empty info.
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self {
            info: Bytes::new(),
            body: body.into(),
        }
    }

    /// Empty info and body.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Bytes> for Response {
    fn from(body: Bytes) -> Self {
        Self::body(body)
    }
}

impl From<Vec<u8>> for Response {
    fn from(body: Vec<u8>) -> Self {
        Self::body(body)
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Self::body(body)
    }
}

impl From<&'static str> for Response {
    fn from(body: &'static str) -> Self {
        Self::body(body)
    }
}

impl From<&'static [u8]> for Response {
    fn from(body: &'static [u8]) -> Self {
        Self::body(body)
    }
}

impl<I, B> From<(I, B)> for Response
where
    I: Into<Bytes>,
    B: Into<Bytes>,
{
    fn from((info, body): (I, B)) -> Self {
        Self::new(info, body)
    }
}

/// Where and how to forward an inbound call.
///
/// The transaction id and sender reference always come from the call being
/// handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    /// Destination name.
    pub name: String,
    pub request_info: Bytes,
    pub request: Bytes,
    pub timeout: u32,
    pub priority: i8,
}

impl Forward {
    /// Forward `request` unchanged to `name`.
    pub fn to(name: impl Into<String>, request: &Request) -> Self {
        Self {
            name: name.into(),
            request_info: request.request_info.clone(),
            request: request.request.clone(),
            timeout: request.timeout,
            priority: request.priority,
        }
    }

    /// Build the wire message for the call being forwarded.
    pub fn into_message(self, call: &Request) -> ForwardMessage {
        ForwardMessage {
            name: self.name,
            request_info: self.request_info,
            request: self.request,
            timeout: self.timeout,
            priority: self.priority,
            trans_id: call.trans_id,
            pid: call.pid.clone(),
        }
    }
}

/// How a handler finished an inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(Response),
    Return(CallKind, Response),
    Forward(CallKind, Forward),
}

impl Outcome {
    /// Normal reply.
    pub fn reply(response: impl Into<Response>) -> Self {
        Outcome::Reply(response.into())
    }

    /// Reply with empty info and body.
    pub fn empty() -> Self {
        Outcome::Reply(Response::empty())
    }

    /// Return now from an async call.
    pub fn return_async(response: impl Into<Response>) -> Self {
        Outcome::Return(CallKind::Async, response.into())
    }

    /// Return now from a sync call.
    pub fn return_sync(response: impl Into<Response>) -> Self {
        Outcome::Return(CallKind::Sync, response.into())
    }

    /// Forward an async call.
    pub fn forward_async(forward: Forward) -> Self {
        Outcome::Forward(CallKind::Async, forward)
    }

    /// Forward a sync call.
    pub fn forward_sync(forward: Forward) -> Self {
        Outcome::Forward(CallKind::Sync, forward)
    }

    /// Forward `request` unchanged to `name`, matching its kind.
    pub fn forward(name: impl Into<String>, request: &Request) -> Self {
        Outcome::Forward(request.kind, Forward::to(name, request))
    }

    /// Kind this outcome requires of the call, if any.
    pub fn required_kind(&self) -> Option<CallKind> {
        match self {
            Outcome::Reply(_) => None,
            Outcome::Return(kind, _) | Outcome::Forward(kind, _) => Some(*kind),
        }
    }
}

impl From<Response> for Outcome {
    fn from(response: Response) -> Self {
        Outcome::Reply(response)
    }
}

impl From<Bytes> for Outcome {
    fn from(body: Bytes) -> Self {
        Outcome::reply(body)
    }
}

impl From<Vec<u8>> for Outcome {
    fn from(body: Vec<u8>) -> Self {
        Outcome::reply(body)
    }
}

impl From<String> for Outcome {
    fn from(body: String) -> Self {
        Outcome::reply(body)
    }
}

impl From<&'static str> for Outcome {
    fn from(body: &'static str) -> Self {
        Outcome::reply(body)
    }
}

impl<I, B> From<(I, B)> for Outcome
where
    I: Into<Bytes>,
    B: Into<Bytes>,
{
    fn from(pair: (I, B)) -> Self {
        Outcome::reply(pair)
    }
}

impl ReturnMessage {
    /// Build the return for `call` carrying `response`.
    pub fn reply_to(call: &Request, response: Response) -> Self {
        ReturnMessage {
            name: call.name.clone(),
            pattern: call.pattern.clone(),
            response_info: response.info,
            response: response.body,
            timeout: call.timeout,
            trans_id: call.trans_id,
            pid: call.pid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TransId;

    fn request(kind: CallKind) -> Request {
        Request {
            kind,
            name: "/a/b".to_string(),
            pattern: "/a/*".to_string(),
            request_info: Bytes::from_static(b"info"),
            request: Bytes::from_static(b"body"),
            timeout: 100,
            priority: 2,
            trans_id: TransId::new([9; 16]),
            pid: Bytes::from_static(b"pid"),
        }
    }

    #[test]
    fn test_single_value_is_body() {
        let outcome: Outcome = "pong".into();
        assert_eq!(outcome, Outcome::Reply(Response::new("", "pong")));
    }

    #[test]
    fn test_pair_is_info_and_body() {
        let outcome: Outcome = (Bytes::from_static(b"i"), b"b".to_vec()).into();
        assert_eq!(outcome, Outcome::Reply(Response::new("i", "b")));
    }

    #[test]
    fn test_forward_copies_call_fields() {
        let call = request(CallKind::Sync);
        let outcome = Outcome::forward("/other", &call);

        assert_eq!(outcome.required_kind(), Some(CallKind::Sync));
        let Outcome::Forward(_, forward) = outcome else {
            panic!("expected forward");
        };
        let msg = forward.into_message(&call);
        assert_eq!(msg.name, "/other");
        assert_eq!(msg.request, call.request);
        assert_eq!(msg.timeout, 100);
        assert_eq!(msg.priority, 2);
        assert_eq!(msg.trans_id, call.trans_id);
        assert_eq!(msg.pid, call.pid);
    }

    #[test]
    fn test_reply_to_echoes_call() {
        let call = request(CallKind::Async);
        let msg = ReturnMessage::reply_to(&call, Response::body("ok"));

        assert_eq!(msg.name, "/a/b");
        assert_eq!(msg.pattern, "/a/*");
        assert!(msg.response_info.is_empty());
        assert_eq!(&msg.response[..], b"ok");
        assert_eq!(msg.trans_id, call.trans_id);
    }

    #[test]
    fn test_reply_has_no_required_kind() {
        assert_eq!(Outcome::empty().required_kind(), None);
        assert_eq!(
            Outcome::return_async("x").required_kind(),
            Some(CallKind::Async)
        );
    }
}
