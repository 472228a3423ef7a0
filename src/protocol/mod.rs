//! Protocol module - wire format, framing, and message types.
//!
//! This module implements the binary protocol spoken on the channel:
//! - Field primitives and message tags
//! - Frame buffer for the length-prefixed framing strategy
//! - Typed inbound and outbound messages

mod frame_buffer;
mod message;
mod wire_format;

pub use frame_buffer::{build_frame, FrameBuffer};
pub use message::{
    ForwardMessage, Inbound, Outbound, RecvResult, Request, ReturnMessage, SendMessage,
    SessionConfig,
};
pub use wire_format::{
    tags, CallKind, TransId, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, TRANS_ID_SIZE,
};
