//! Typed wire messages.
//!
//! [`Inbound`] covers everything the runtime sends to a worker, [`Outbound`]
//! everything a worker sends to the runtime. Both directions can be encoded
//! and decoded; the worker only ever decodes `Inbound` and encodes `Outbound`,
//! the other half exists for tooling and tests that play the runtime side.
//!
//! # Example
//!
//! ```
//! use servlink::protocol::{Inbound, TransId};
//!
//! let msg = Inbound::ReturnAsync(TransId::new([7; 16]));
//! let bytes = msg.encode();
//! assert_eq!(Inbound::decode(bytes).unwrap(), msg);
//! ```

use bytes::Bytes;

use super::wire_format::{tags, CallKind, FieldReader, FieldWriter, TransId};
use crate::error::{Result, ServlinkError};

/// Session defaults delivered by the runtime's `Init` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Prefix prepended to every subscribed pattern.
    pub prefix: String,
    /// Default timeout for asynchronous requests (milliseconds).
    pub timeout_async: u32,
    /// Default timeout for synchronous requests (milliseconds).
    pub timeout_sync: u32,
    /// Default request priority.
    pub priority_default: i8,
}

/// An inbound service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Async or sync call; decides the kind of reply.
    pub kind: CallKind,
    /// Name the caller sent to.
    pub name: String,
    /// Subscription pattern that matched `name`.
    pub pattern: String,
    pub request_info: Bytes,
    pub request: Bytes,
    pub timeout: u32,
    pub priority: i8,
    pub trans_id: TransId,
    /// Opaque sender reference.
    pub pid: Bytes,
}

/// Response info, body and transaction id of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecvResult {
    pub response_info: Bytes,
    pub response: Bytes,
    pub trans_id: TransId,
}

/// Messages sent by the runtime to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Init(SessionConfig),
    /// `SendAsync` or `SendSync`, depending on `Request::kind`.
    Send(Request),
    RecvAsync(RecvResult),
    ReturnAsync(TransId),
    ReturnSync(RecvResult),
    ReturnsAsync(Vec<TransId>),
    Keepalive,
}

/// Outgoing request parameters shared by send and mcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub name: String,
    pub request_info: Bytes,
    pub request: Bytes,
    pub timeout: u32,
    pub priority: i8,
}

/// Reply to an inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnMessage {
    pub name: String,
    pub pattern: String,
    pub response_info: Bytes,
    pub response: Bytes,
    pub timeout: u32,
    pub trans_id: TransId,
    pub pid: Bytes,
}

/// Redirect of an inbound call to another destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardMessage {
    /// Destination name.
    pub name: String,
    pub request_info: Bytes,
    pub request: Bytes,
    pub timeout: u32,
    pub priority: i8,
    pub trans_id: TransId,
    pub pid: Bytes,
}

/// Messages sent by the worker to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Init,
    Send(CallKind, SendMessage),
    RecvAsync { timeout: u32, trans_id: TransId },
    Return(CallKind, ReturnMessage),
    McastAsync(SendMessage),
    Keepalive,
    Subscribe(String),
    Unsubscribe(String),
    Forward(CallKind, ForwardMessage),
}

fn unknown_tag(tag: u32) -> ServlinkError {
    ServlinkError::Protocol(format!("unknown message tag {}", tag))
}

fn ensure_consumed(rest: &Bytes, tag: u32) -> Result<()> {
    if !rest.is_empty() {
        return Err(ServlinkError::Protocol(format!(
            "{} trailing bytes after message tag {}",
            rest.len(),
            tag
        )));
    }
    Ok(())
}

fn read_tag(frame: &mut Bytes) -> Result<u32> {
    FieldReader::new(frame).u32("message tag")
}

impl Inbound {
    /// Encode to wire bytes (without frame prefix).
    pub fn encode(&self) -> Bytes {
        match self {
            Inbound::Init(config) => {
                let mut w = FieldWriter::new(tags::INIT);
                w.string(&config.prefix)
                    .u32(config.timeout_async)
                    .u32(config.timeout_sync)
                    .i8(config.priority_default);
                w.finish()
            }
            Inbound::Send(req) => {
                let tag = match req.kind {
                    CallKind::Async => tags::SEND_ASYNC,
                    CallKind::Sync => tags::SEND_SYNC,
                };
                let mut w = FieldWriter::new(tag);
                w.string(&req.name)
                    .string(&req.pattern)
                    .blob(&req.request_info)
                    .blob(&req.request)
                    .u32(req.timeout)
                    .i8(req.priority)
                    .trans_id(&req.trans_id)
                    .pid(&req.pid);
                w.finish()
            }
            Inbound::RecvAsync(result) => encode_recv_result(tags::RECV_ASYNC, result),
            Inbound::ReturnSync(result) => encode_recv_result(tags::RETURN_SYNC, result),
            Inbound::ReturnAsync(trans_id) => {
                let mut w = FieldWriter::new(tags::RETURN_ASYNC);
                w.trans_id(trans_id);
                w.finish()
            }
            Inbound::ReturnsAsync(ids) => {
                let mut w = FieldWriter::new(tags::RETURNS_ASYNC);
                w.u32(ids.len() as u32);
                for id in ids {
                    w.trans_id(id);
                }
                w.finish()
            }
            Inbound::Keepalive => FieldWriter::new(tags::KEEPALIVE).finish(),
        }
    }

    /// Decode a frame holding exactly one message.
    pub fn decode(mut frame: Bytes) -> Result<Self> {
        let msg = Self::decode_prefix(&mut frame)?;
        ensure_consumed(&frame, msg.tag())?;
        Ok(msg)
    }

    /// Decode one message from the front of `frame`, advancing past it.
    pub fn decode_prefix(frame: &mut Bytes) -> Result<Self> {
        let tag = read_tag(frame)?;
        let mut r = FieldReader::new(frame);
        let msg = match tag {
            tags::INIT => Inbound::Init(SessionConfig {
                prefix: r.string("prefix")?,
                timeout_async: r.u32("timeout_async")?,
                timeout_sync: r.u32("timeout_sync")?,
                priority_default: r.i8("priority_default")?,
            }),
            tags::SEND_ASYNC | tags::SEND_SYNC => Inbound::Send(Request {
                kind: if tag == tags::SEND_ASYNC {
                    CallKind::Async
                } else {
                    CallKind::Sync
                },
                name: r.string("name")?,
                pattern: r.string("pattern")?,
                request_info: r.blob("request_info")?,
                request: r.blob("request")?,
                timeout: r.u32("timeout")?,
                priority: r.i8("priority")?,
                trans_id: r.trans_id()?,
                pid: r.pid()?,
            }),
            tags::RECV_ASYNC => Inbound::RecvAsync(decode_recv_result(&mut r)?),
            tags::RETURN_SYNC => Inbound::ReturnSync(decode_recv_result(&mut r)?),
            tags::RETURN_ASYNC => Inbound::ReturnAsync(r.trans_id()?),
            tags::RETURNS_ASYNC => {
                let count = r.u32("trans_id count")?;
                let mut ids = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    ids.push(r.trans_id()?);
                }
                Inbound::ReturnsAsync(ids)
            }
            tags::KEEPALIVE => Inbound::Keepalive,
            other => return Err(unknown_tag(other)),
        };
        Ok(msg)
    }

    /// Wire tag of this message.
    pub fn tag(&self) -> u32 {
        match self {
            Inbound::Init(_) => tags::INIT,
            Inbound::Send(req) => match req.kind {
                CallKind::Async => tags::SEND_ASYNC,
                CallKind::Sync => tags::SEND_SYNC,
            },
            Inbound::RecvAsync(_) => tags::RECV_ASYNC,
            Inbound::ReturnAsync(_) => tags::RETURN_ASYNC,
            Inbound::ReturnSync(_) => tags::RETURN_SYNC,
            Inbound::ReturnsAsync(_) => tags::RETURNS_ASYNC,
            Inbound::Keepalive => tags::KEEPALIVE,
        }
    }
}

fn encode_recv_result(tag: u32, result: &RecvResult) -> Bytes {
    let mut w = FieldWriter::new(tag);
    w.blob(&result.response_info)
        .blob(&result.response)
        .trans_id(&result.trans_id);
    w.finish()
}

fn decode_recv_result(r: &mut FieldReader<'_>) -> Result<RecvResult> {
    Ok(RecvResult {
        response_info: r.blob("response_info")?,
        response: r.blob("response")?,
        trans_id: r.trans_id()?,
    })
}

impl Outbound {
    /// Encode to wire bytes (without frame prefix).
    pub fn encode(&self) -> Bytes {
        match self {
            Outbound::Init => FieldWriter::new(tags::INIT).finish(),
            Outbound::Send(kind, msg) => {
                let tag = match kind {
                    CallKind::Async => tags::SEND_ASYNC,
                    CallKind::Sync => tags::SEND_SYNC,
                };
                encode_send(tag, msg)
            }
            Outbound::McastAsync(msg) => encode_send(tags::MCAST_ASYNC, msg),
            Outbound::RecvAsync { timeout, trans_id } => {
                let mut w = FieldWriter::new(tags::RECV_ASYNC);
                w.u32(*timeout).trans_id(trans_id);
                w.finish()
            }
            Outbound::Return(kind, msg) => {
                let tag = match kind {
                    CallKind::Async => tags::RETURN_ASYNC,
                    CallKind::Sync => tags::RETURN_SYNC,
                };
                let mut w = FieldWriter::new(tag);
                w.string(&msg.name)
                    .string(&msg.pattern)
                    .blob(&msg.response_info)
                    .blob(&msg.response)
                    .u32(msg.timeout)
                    .trans_id(&msg.trans_id)
                    .pid(&msg.pid);
                w.finish()
            }
            Outbound::Forward(kind, msg) => {
                let tag = match kind {
                    CallKind::Async => tags::FORWARD_ASYNC,
                    CallKind::Sync => tags::FORWARD_SYNC,
                };
                let mut w = FieldWriter::new(tag);
                w.string(&msg.name)
                    .blob(&msg.request_info)
                    .blob(&msg.request)
                    .u32(msg.timeout)
                    .i8(msg.priority)
                    .trans_id(&msg.trans_id)
                    .pid(&msg.pid);
                w.finish()
            }
            Outbound::Keepalive => FieldWriter::new(tags::KEEPALIVE).finish(),
            Outbound::Subscribe(pattern) => {
                let mut w = FieldWriter::new(tags::SUBSCRIBE);
                w.string(pattern);
                w.finish()
            }
            Outbound::Unsubscribe(pattern) => {
                let mut w = FieldWriter::new(tags::UNSUBSCRIBE);
                w.string(pattern);
                w.finish()
            }
        }
    }

    /// Decode a frame holding exactly one message.
    pub fn decode(mut frame: Bytes) -> Result<Self> {
        let tag = read_tag(&mut frame)?;
        let mut r = FieldReader::new(&mut frame);
        let msg = match tag {
            tags::INIT => Outbound::Init,
            tags::SEND_ASYNC => Outbound::Send(CallKind::Async, decode_send(&mut r)?),
            tags::SEND_SYNC => Outbound::Send(CallKind::Sync, decode_send(&mut r)?),
            tags::MCAST_ASYNC => Outbound::McastAsync(decode_send(&mut r)?),
            tags::RECV_ASYNC => Outbound::RecvAsync {
                timeout: r.u32("timeout")?,
                trans_id: r.trans_id()?,
            },
            tags::RETURN_ASYNC | tags::RETURN_SYNC => {
                let kind = if tag == tags::RETURN_ASYNC {
                    CallKind::Async
                } else {
                    CallKind::Sync
                };
                Outbound::Return(
                    kind,
                    ReturnMessage {
                        name: r.string("name")?,
                        pattern: r.string("pattern")?,
                        response_info: r.blob("response_info")?,
                        response: r.blob("response")?,
                        timeout: r.u32("timeout")?,
                        trans_id: r.trans_id()?,
                        pid: r.pid()?,
                    },
                )
            }
            tags::FORWARD_ASYNC | tags::FORWARD_SYNC => {
                let kind = if tag == tags::FORWARD_ASYNC {
                    CallKind::Async
                } else {
                    CallKind::Sync
                };
                Outbound::Forward(
                    kind,
                    ForwardMessage {
                        name: r.string("name")?,
                        request_info: r.blob("request_info")?,
                        request: r.blob("request")?,
                        timeout: r.u32("timeout")?,
                        priority: r.i8("priority")?,
                        trans_id: r.trans_id()?,
                        pid: r.pid()?,
                    },
                )
            }
            tags::KEEPALIVE => Outbound::Keepalive,
            tags::SUBSCRIBE => Outbound::Subscribe(r.string("pattern")?),
            tags::UNSUBSCRIBE => Outbound::Unsubscribe(r.string("pattern")?),
            other => return Err(unknown_tag(other)),
        };
        ensure_consumed(&frame, tag)?;
        Ok(msg)
    }
}

fn encode_send(tag: u32, msg: &SendMessage) -> Bytes {
    let mut w = FieldWriter::new(tag);
    w.string(&msg.name)
        .blob(&msg.request_info)
        .blob(&msg.request)
        .u32(msg.timeout)
        .i8(msg.priority);
    w.finish()
}

fn decode_send(r: &mut FieldReader<'_>) -> Result<SendMessage> {
    Ok(SendMessage {
        name: r.string("name")?,
        request_info: r.blob("request_info")?,
        request: r.blob("request")?,
        timeout: r.u32("timeout")?,
        priority: r.i8("priority")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trans_id(seed: u8) -> TransId {
        let mut raw = [0u8; 16];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = seed.wrapping_add(i as u8);
        }
        TransId::new(raw)
    }

    fn sample_request(kind: CallKind) -> Request {
        Request {
            kind,
            name: "/svc/echo/get".to_string(),
            pattern: "/svc/echo/*".to_string(),
            request_info: Bytes::from_static(b"key\0value\0"),
            request: Bytes::from_static(b"\0\0ping\0"),
            timeout: 5000,
            priority: -3,
            trans_id: trans_id(1),
            pid: Bytes::from_static(&[131, 103, 100, 0, 3, b'p', b'i', b'd']),
        }
    }

    #[test]
    fn test_inbound_round_trip_all_kinds() {
        let messages = vec![
            Inbound::Init(SessionConfig {
                prefix: "/prefix/".to_string(),
                timeout_async: 5000,
                timeout_sync: 3000,
                priority_default: 0,
            }),
            Inbound::Send(sample_request(CallKind::Async)),
            Inbound::Send(sample_request(CallKind::Sync)),
            Inbound::RecvAsync(RecvResult {
                response_info: Bytes::new(),
                response: Bytes::from_static(b"pong"),
                trans_id: trans_id(2),
            }),
            Inbound::ReturnAsync(trans_id(3)),
            Inbound::ReturnSync(RecvResult {
                response_info: Bytes::from_static(b"\0"),
                response: Bytes::new(),
                trans_id: trans_id(4),
            }),
            Inbound::ReturnsAsync(vec![trans_id(5), trans_id(6), trans_id(7)]),
            Inbound::ReturnsAsync(Vec::new()),
            Inbound::Keepalive,
        ];

        for msg in messages {
            let decoded = Inbound::decode(msg.encode()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_outbound_round_trip_all_kinds() {
        let send = SendMessage {
            name: "/svc/other".to_string(),
            request_info: Bytes::new(),
            request: Bytes::from_static(b"a\0b"),
            timeout: 1000,
            priority: 1,
        };
        let ret = ReturnMessage {
            name: "/test".to_string(),
            pattern: "/test".to_string(),
            response_info: Bytes::new(),
            response: Bytes::from_static(b"pong"),
            timeout: 1000,
            trans_id: trans_id(9),
            pid: Bytes::from_static(b"sender"),
        };
        let fwd = ForwardMessage {
            name: "/elsewhere".to_string(),
            request_info: Bytes::from_static(b"i"),
            request: Bytes::new(),
            timeout: 250,
            priority: -1,
            trans_id: trans_id(10),
            pid: Bytes::new(),
        };
        let messages = vec![
            Outbound::Init,
            Outbound::Send(CallKind::Async, send.clone()),
            Outbound::Send(CallKind::Sync, send.clone()),
            Outbound::McastAsync(send),
            Outbound::RecvAsync {
                timeout: 10,
                trans_id: TransId::NULL,
            },
            Outbound::Return(CallKind::Async, ret.clone()),
            Outbound::Return(CallKind::Sync, ret),
            Outbound::Forward(CallKind::Async, fwd.clone()),
            Outbound::Forward(CallKind::Sync, fwd),
            Outbound::Keepalive,
            Outbound::Subscribe("/a/*".to_string()),
            Outbound::Unsubscribe("".to_string()),
        ];

        for msg in messages {
            let decoded = Outbound::decode(msg.encode()).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut raw = Inbound::ReturnAsync(trans_id(1)).encode().to_vec();
        raw.push(0);
        let err = Inbound::decode(Bytes::from(raw)).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_truncated_message_rejected() {
        let raw = Inbound::Send(sample_request(CallKind::Sync)).encode();
        let short = raw.slice(..raw.len() - 1);
        assert!(matches!(
            Inbound::decode(short),
            Err(ServlinkError::Protocol(_))
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let raw = Bytes::from(99u32.to_ne_bytes().to_vec());
        let err = Inbound::decode(raw).unwrap_err();
        assert!(err.to_string().contains("unknown message tag 99"));
    }

    #[test]
    fn test_decode_prefix_walks_back_to_back_messages() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&Inbound::Keepalive.encode());
        raw.extend_from_slice(&Inbound::Keepalive.encode());
        raw.extend_from_slice(&Inbound::ReturnAsync(trans_id(4)).encode());
        let mut frame = Bytes::from(raw);

        assert_eq!(Inbound::decode_prefix(&mut frame).unwrap(), Inbound::Keepalive);
        assert_eq!(Inbound::decode_prefix(&mut frame).unwrap(), Inbound::Keepalive);
        assert_eq!(
            Inbound::decode_prefix(&mut frame).unwrap(),
            Inbound::ReturnAsync(trans_id(4))
        );
        assert!(frame.is_empty());
    }

    #[test]
    fn test_init_layout_matches_runtime() {
        let msg = Inbound::Init(SessionConfig {
            prefix: "/p/".to_string(),
            timeout_async: 1,
            timeout_sync: 2,
            priority_default: -1,
        });
        let mut expected = Vec::new();
        expected.extend_from_slice(&1u32.to_ne_bytes());
        expected.extend_from_slice(&4u32.to_ne_bytes());
        expected.extend_from_slice(b"/p/\0");
        expected.extend_from_slice(&1u32.to_ne_bytes());
        expected.extend_from_slice(&2u32.to_ne_bytes());
        expected.push(0xff);
        assert_eq!(&msg.encode()[..], &expected[..]);
    }
}
