// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Value codecs.
//!
//! A store records which codec its values were written with. The codec is chosen once at
//! open time and kept as a resolved encode/decode pair.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::SerializationError;

/// Identifies a value codec in the metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecId {
    /// Values are stored as given.
    Raw,
    Json,
    Bincode,
    /// A user-supplied codec, identified by name.
    Custom(String),
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecId::Raw => write!(f, "raw"),
            CodecId::Json => write!(f, "json"),
            CodecId::Bincode => write!(f, "bincode"),
            CodecId::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

type EncodeFn<V> = Arc<dyn Fn(&V) -> Result<Vec<u8>, SerializationError> + Send + Sync>;
type DecodeFn<V> = Arc<dyn Fn(&[u8]) -> Result<V, SerializationError> + Send + Sync>;

/// Converts values of type `V` to and from stored bytes.
pub struct Codec<V> {
    id: CodecId,
    encode: EncodeFn<V>,
    decode: DecodeFn<V>,
}

impl<V> Clone for Codec<V> {
    fn clone(&self) -> Self {
        Codec {
            id: self.id.clone(),
            encode: self.encode.clone(),
            decode: self.decode.clone(),
        }
    }
}

impl<V> fmt::Debug for Codec<V> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Codec({})", self.id)
    }
}

impl Codec<Vec<u8>> {
    pub fn raw() -> Self {
        Codec {
            id: CodecId::Raw,
            encode: Arc::new(|v: &Vec<u8>| Ok(v.clone())),
            decode: Arc::new(|b: &[u8]| Ok(b.to_vec())),
        }
    }
}

impl<V> Codec<V>
where V: Serialize + DeserializeOwned + 'static
{
    pub fn json() -> Self {
        Codec {
            id: CodecId::Json,
            encode: Arc::new(|v: &V| {
                serde_json::to_vec(v).map_err(|e| SerializationError::new("json", e))
            }),
            decode: Arc::new(|b: &[u8]| {
                serde_json::from_slice(b).map_err(|e| SerializationError::new("json", e))
            }),
        }
    }

    pub fn bincode() -> Self {
        Codec {
            id: CodecId::Bincode,
            encode: Arc::new(|v: &V| {
                bincode::serialize(v).map_err(|e| SerializationError::new("bincode", e))
            }),
            decode: Arc::new(|b: &[u8]| {
                bincode::deserialize(b).map_err(|e| SerializationError::new("bincode", e))
            }),
        }
    }
}

impl<V> Codec<V> {
    pub fn custom(
        name: impl ToString,
        encode: impl Fn(&V) -> Result<Vec<u8>, SerializationError> + Send + Sync + 'static,
        decode: impl Fn(&[u8]) -> Result<V, SerializationError> + Send + Sync + 'static,
    ) -> Self {
        Codec {
            id: CodecId::Custom(name.to_string()),
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    pub fn id(&self) -> &CodecId {
        &self.id
    }

    pub fn encode(&self, value: &V) -> Result<Vec<u8>, SerializationError> {
        (self.encode)(value)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<V, SerializationError> {
        (self.decode)(bytes)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde::Serialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        station: String,
        value: f64,
    }

    #[test]
    fn test_structured_codecs() {
        let r = Reading {
            station: "s1".to_string(),
            value: 1.5,
        };

        let json = Codec::<Reading>::json();
        let bytes = json.encode(&r).unwrap();
        assert_eq!(bytes, br#"{"station":"s1","value":1.5}"#.to_vec());
        assert_eq!(json.decode(&bytes).unwrap(), r);

        let bin = Codec::<Reading>::bincode();
        assert_eq!(bin.decode(&bin.encode(&r).unwrap()).unwrap(), r);
    }

    #[test]
    fn test_decode_failure_names_codec() {
        let err = Codec::<Reading>::json().decode(b"\x00\x01").unwrap_err();
        assert_eq!(err.codec(), "json");
    }

    #[test]
    fn test_custom_codec() {
        let upper = Codec::<String>::custom(
            "upper",
            |s: &String| Ok(s.to_uppercase().into_bytes()),
            |b: &[u8]| {
                String::from_utf8(b.to_vec()).map_err(|e| SerializationError::new("upper", e))
            },
        );

        assert_eq!(upper.id(), &CodecId::Custom("upper".to_string()));
        assert_eq!(upper.encode(&"ab".to_string()).unwrap(), b"AB".to_vec());
        assert_eq!(upper.decode(b"AB").unwrap(), "AB");
    }

    #[test]
    fn test_codec_id_in_metadata_form() {
        assert_eq!(serde_json::to_string(&CodecId::Json).unwrap(), "\"json\"");
        assert_eq!(
            serde_json::to_string(&CodecId::Custom("x".to_string())).unwrap(),
            r#"{"custom":"x"}"#
        );
        assert_eq!(CodecId::Custom("x".to_string()).to_string(), "custom:x");
    }
}
