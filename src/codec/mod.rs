//! Codec module - helpers for payload formats carried inside messages.
//!
//! Request and response info payloads (and HTTP query strings forwarded by
//! the runtime) use a flat binary key-value format: NUL-terminated keys and
//! values, alternating.
//!
//! - [`KeyValueCodec`] - encode and decode that format
//! - [`KeyValues`] - decoded pairs; repeated keys keep every value
//!
//! # Example
//!
//! ```
//! use servlink::codec::KeyValueCodec;
//!
//! let info = KeyValueCodec::encode([("accept", "text/plain"), ("accept", "*/*")]);
//! let decoded = KeyValueCodec::decode(&info);
//!
//! assert_eq!(decoded.get("accept"), Some("text/plain"));
//! assert_eq!(decoded.get_all("accept"), ["text/plain", "*/*"]);
//! ```

mod key_value;

pub use key_value::{KeyValueCodec, KeyValues};
