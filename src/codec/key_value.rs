//! Flat binary key-value format.
//!
//! `key1\0value1\0key2\0value2\0...`. The final terminator is optional on
//! decode. A key with no value decodes to an empty value. Keys and values
//! are decoded as UTF-8, replacing invalid sequences.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::{RecvResult, Request};

/// Decoded key-value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValues {
    entries: HashMap<String, Vec<String>>,
}

impl KeyValues {
    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value for `key`, in order of appearance.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over keys and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no keys are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume into the underlying map.
    pub fn into_map(self) -> HashMap<String, Vec<String>> {
        self.entries
    }
}

/// Codec for the flat binary key-value format.
pub struct KeyValueCodec;

impl KeyValueCodec {
    /// Encode pairs, terminating every key and value with NUL.
    pub fn encode<I, K, V>(pairs: I) -> Bytes
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut buf = BytesMut::new();
        for (key, value) in pairs {
            buf.put_slice(key.as_ref());
            buf.put_u8(0);
            buf.put_slice(value.as_ref());
            buf.put_u8(0);
        }
        buf.freeze()
    }

    /// Decode a flat binary into key-value pairs.
    pub fn decode(data: &[u8]) -> KeyValues {
        let data = data.strip_suffix(&[0]).unwrap_or(data);
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        if data.is_empty() {
            return KeyValues { entries };
        }

        let mut pieces = data.split(|&b| b == 0);
        while let Some(key) = pieces.next() {
            let value = pieces.next().unwrap_or_default();
            entries
                .entry(String::from_utf8_lossy(key).into_owned())
                .or_default()
                .push(String::from_utf8_lossy(value).into_owned());
        }

        KeyValues { entries }
    }
}

impl Request {
    /// Decode the request info as key-value pairs.
    pub fn info_key_values(&self) -> KeyValues {
        KeyValueCodec::decode(&self.request_info)
    }

    /// Decode the request body as key-value pairs.
    ///
    /// The runtime delivers HTTP query strings in this form.
    pub fn request_key_values(&self) -> KeyValues {
        KeyValueCodec::decode(&self.request)
    }
}

impl RecvResult {
    /// Decode the response info as key-value pairs.
    pub fn info_key_values(&self) -> KeyValues {
        KeyValueCodec::decode(&self.response_info)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::{CallKind, TransId};

    #[test]
    fn test_decode_pairs() {
        let kv = KeyValueCodec::decode(b"host\0example.org\0method\0GET\0");

        assert_eq!(kv.len(), 2);
        assert_eq!(kv.get("host"), Some("example.org"));
        assert_eq!(kv.get("method"), Some("GET"));
        assert_eq!(kv.get("missing"), None);
    }

    #[test]
    fn test_repeated_keys_collect_in_order() {
        let kv = KeyValueCodec::decode(b"a\x001\0b\x002\0a\x003\0a\x004\0");

        assert_eq!(kv.get_all("a"), ["1", "3", "4"]);
        assert_eq!(kv.get_all("b"), ["2"]);
        assert_eq!(kv.get("a"), Some("1"));
    }

    #[test]
    fn test_missing_final_terminator() {
        let kv = KeyValueCodec::decode(b"k\0v");
        assert_eq!(kv.get("k"), Some("v"));
    }

    #[test]
    fn test_key_without_value() {
        let kv = KeyValueCodec::decode(b"k\0v\0lonely\0");

        assert!(kv.contains_key("lonely"));
        assert_eq!(kv.get("lonely"), Some(""));
    }

    #[test]
    fn test_empty_value_kept() {
        let kv = KeyValueCodec::decode(b"empty\0\0next\0x\0");

        assert_eq!(kv.get("empty"), Some(""));
        assert_eq!(kv.get("next"), Some("x"));
    }

    #[test]
    fn test_empty_input() {
        assert!(KeyValueCodec::decode(b"").is_empty());
        assert!(KeyValueCodec::decode(b"\0").get_all("").is_empty());
    }

    #[test]
    fn test_encode_layout() {
        let encoded = KeyValueCodec::encode([("a", "1"), ("b", "")]);
        assert_eq!(&encoded[..], b"a\x001\0b\0\0");
    }

    #[test]
    fn test_encode_then_decode() {
        let encoded = KeyValueCodec::encode(vec![
            ("x".to_string(), "1".to_string()),
            ("x".to_string(), "2".to_string()),
        ]);
        let kv = KeyValueCodec::decode(&encoded);

        assert_eq!(kv.get_all("x"), ["1", "2"]);
    }

    #[test]
    fn test_request_body_key_values() {
        let request = Request {
            kind: CallKind::Async,
            name: "/web/search/get".to_string(),
            pattern: "/web/search/get".to_string(),
            request_info: KeyValueCodec::encode([("method", "GET")]),
            request: Bytes::from_static(b"q\0rust\0page\x002\0q\0tokio\0"),
            timeout: 5000,
            priority: 0,
            trans_id: TransId::new([7; 16]),
            pid: Bytes::from_static(b"pid"),
        };

        let query = request.request_key_values();
        assert_eq!(query.get_all("q"), ["rust", "tokio"]);
        assert_eq!(query.get("page"), Some("2"));
        assert_eq!(request.info_key_values().get("method"), Some("GET"));
    }
}
