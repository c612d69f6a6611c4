//! # Value Codecs
//!
//! Converts application values to the bytes stored on a cache node and back.
//!
//! Values are anything implementing serde's `Serialize` / `DeserializeOwned`,
//! so the capability is resolved at compile time per type rather than by
//! inspecting values at runtime. The concrete wire encoding is a deployment
//! choice:
//!
//! ```text
//! Codec (enum)            <- selected by ClientConfig::codec
//!   ├── Json              <- JSON text, interoperable with Ruby/Dalli JSON serializers
//!   └── Bincode           <- compact binary, Rust-only deployments
//! ```
//!
//! Every encoded item is tagged with [`FLAG_SERIALIZED`]. Items written by
//! other clients without that flag are raw strings and are decoded leniently
//! (see [`Codec::decode`]).

mod finite;

use crate::constants::{FLAG_COMPRESSED, FLAG_SERIALIZED};
use crate::error::{CacheError, CacheResult};
use bytes::Bytes;
use serde::de::value::{Error as ValueError, StringDeserializer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serialization codec used for stored values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// JSON text encoding
    #[default]
    Json,
    /// bincode binary encoding
    Bincode,
}

/// Bytes and item flags ready to be written to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    pub data: Bytes,
    pub flags: u32,
}

impl EncodedValue {
    /// Wrap uncoded bytes (flags = 0)
    pub fn raw(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            flags: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Codec {
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Bincode => "bincode",
        }
    }

    /// Encode a value, tagging it as serialized
    pub fn encode<T>(&self, value: &T) -> CacheResult<EncodedValue>
    where
        T: Serialize + ?Sized,
    {
        let data = match self {
            Codec::Json => {
                finite::ensure_finite(value)
                    .map_err(|e| CacheError::EncodingError(e.to_string()))?;
                serde_json::to_vec(value)?
            }
            Codec::Bincode => bincode::serialize(value)?,
        };

        Ok(EncodedValue {
            data: Bytes::from(data),
            flags: FLAG_SERIALIZED,
        })
    }

    /// Decode an item read from a node.
    ///
    /// Serialized items go through the configured codec. Raw items (flags
    /// without [`FLAG_SERIALIZED`]) must be UTF-8; they are offered to `T` as a
    /// plain string first and as a JSON literal second, so both
    /// `get::<String>` on foreign strings and `get::<u64>` on counters work.
    pub fn decode<T>(&self, data: &[u8], flags: u32) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        if flags & FLAG_COMPRESSED != 0 {
            return Err(CacheError::EncodingError(
                "compressed values are not supported".to_string(),
            ));
        }

        if flags & FLAG_SERIALIZED == 0 {
            return Self::decode_raw(data);
        }

        match self {
            Codec::Json => Ok(serde_json::from_slice(data)?),
            Codec::Bincode => Ok(bincode::deserialize(data)?),
        }
    }

    fn decode_raw<T>(data: &[u8]) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        let text = std::str::from_utf8(data).map_err(|e| {
            CacheError::EncodingError(format!("raw value is not valid UTF-8: {e}"))
        })?;

        let as_string = T::deserialize(StringDeserializer::<ValueError>::new(text.to_string()));
        match as_string {
            Ok(value) => Ok(value),
            Err(string_err) => serde_json::from_str(text).map_err(|_| {
                CacheError::EncodingError(format!("raw value does not match target type: {string_err}"))
            }),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "bincode" => Ok(Codec::Bincode),
            other => Err(CacheError::config_error(format!("unknown codec '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        id: u64,
        tags: Vec<String>,
        attributes: BTreeMap<String, i64>,
    }

    fn payload() -> Payload {
        Payload {
            id: 7,
            tags: vec!["a".to_string(), "b".to_string()],
            attributes: BTreeMap::from([("x".to_string(), -1), ("y".to_string(), 2)]),
        }
    }

    #[test]
    fn test_json_scalar_is_wire_compatible() {
        let encoded = Codec::Json.encode(&5u32).unwrap();
        assert_eq!(&encoded.data[..], b"5");
        assert_eq!(encoded.flags, FLAG_SERIALIZED);
    }

    #[test]
    fn test_json_nested_mapping() {
        let value = json!({"name": "cream", "nodes": [1, 2, 3], "meta": {"up": true}});
        let encoded = Codec::Json.encode(&value).unwrap();
        let decoded: serde_json::Value = Codec::Json.decode(&encoded.data, encoded.flags).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_bincode_struct() {
        let encoded = Codec::Bincode.encode(&payload()).unwrap();
        let decoded: Payload = Codec::Bincode.decode(&encoded.data, encoded.flags).unwrap();
        assert_eq!(decoded, payload());
    }

    #[test]
    fn test_type_mismatch_is_encoding_error() {
        let encoded = Codec::Json.encode(&"text").unwrap();
        let result: CacheResult<u64> = Codec::Json.decode(&encoded.data, encoded.flags);
        assert!(matches!(result, Err(CacheError::EncodingError(_))));
    }

    #[test]
    fn test_non_string_map_keys_rejected_by_json() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], 1u8);
        assert!(matches!(
            Codec::Json.encode(&map),
            Err(CacheError::EncodingError(_))
        ));
    }

    #[test]
    fn test_non_finite_floats_rejected_by_json() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                Codec::Json.encode(&value),
                Err(CacheError::EncodingError(_))
            ));
        }
        assert!(matches!(
            Codec::Json.encode(&vec![1.0f32, f32::NAN]),
            Err(CacheError::EncodingError(_))
        ));

        let encoded = Codec::Json.encode(&1.5f64).unwrap();
        assert_eq!(Codec::Json.decode::<f64>(&encoded.data, encoded.flags).unwrap(), 1.5);
    }

    #[test]
    fn test_bincode_keeps_non_finite_floats() {
        let encoded = Codec::Bincode.encode(&f64::INFINITY).unwrap();
        let decoded: f64 = Codec::Bincode.decode(&encoded.data, encoded.flags).unwrap();
        assert_eq!(decoded, f64::INFINITY);

        let encoded = Codec::Bincode.encode(&f64::NAN).unwrap();
        let decoded: f64 = Codec::Bincode.decode(&encoded.data, encoded.flags).unwrap();
        assert!(decoded.is_nan());
    }

    #[test]
    fn test_raw_values_decode_as_string_or_number() {
        let text: String = Codec::Json.decode(b"hello", 0).unwrap();
        assert_eq!(text, "hello");

        let counter: u64 = Codec::Bincode.decode(b"42", 0).unwrap();
        assert_eq!(counter, 42);

        let counter_text: String = Codec::Json.decode(b"42", 0).unwrap();
        assert_eq!(counter_text, "42");
    }

    #[test]
    fn test_compressed_flag_rejected() {
        let result: CacheResult<String> = Codec::Json.decode(b"x", FLAG_SERIALIZED | FLAG_COMPRESSED);
        assert!(matches!(result, Err(CacheError::EncodingError(_))));
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!("JSON".parse::<Codec>().unwrap(), Codec::Json);
        assert_eq!("bincode".parse::<Codec>().unwrap(), Codec::Bincode);
        assert!("marshal".parse::<Codec>().is_err());
    }
}
