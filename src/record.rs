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

use crate::digest::Digest;
use crate::digest::DIGEST_LEN;
use crate::errors::DigestError;

/// A cached entry as persisted in the local store: the digest prefix followed by the
/// payload bytes, stored as one value so the two are always written together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRecord {
    pub digest: Digest,
    pub payload: Vec<u8>,
}

impl LocalRecord {
    pub fn new(digest: Digest, payload: Vec<u8>) -> Self {
        LocalRecord { digest, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DIGEST_LEN + self.payload.len());
        buf.extend_from_slice(&self.digest.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(mut bytes: Vec<u8>) -> Result<Self, DigestError> {
        if bytes.len() < DIGEST_LEN {
            return Err(DigestError::TruncatedRecord {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }

        let digest = Digest::decode(&bytes[..DIGEST_LEN])?;
        let payload = bytes.split_off(DIGEST_LEN);

        Ok(LocalRecord { digest, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_prefixes_digest() {
        let digest = Digest::of(b"payload", 42).unwrap();
        let rec = LocalRecord::new(digest, b"payload".to_vec());

        let bytes = rec.encode();
        assert_eq!(bytes.len(), DIGEST_LEN + 7);
        assert_eq!(&bytes[DIGEST_LEN..], b"payload");

        assert_eq!(LocalRecord::decode(bytes).unwrap(), rec);
    }

    #[test]
    fn test_empty_payload() {
        let rec = LocalRecord::new(Digest::of(b"", 1).unwrap(), vec![]);
        let decoded = LocalRecord::decode(rec.encode()).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_truncated() {
        let err = LocalRecord::decode(vec![0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            DigestError::TruncatedRecord {
                expected: DIGEST_LEN,
                actual: 10
            }
        );
    }
}
