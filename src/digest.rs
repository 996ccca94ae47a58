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

//! Fixed-width freshness digest.
//!
//! A [`Digest`] fingerprints one stored value without carrying the value itself, so the
//! freshness of a cached copy can be decided from the remote index alone.
//!
//! Wire layout, 26 bytes, all integers little-endian:
//!
//! ```text
//! 0        6                        22       26
//! +--------+------------------------+--------+
//! | ts i48 | md5 of payload (16)    | size   |
//! +--------+------------------------+--------+
//! ```
//!
//! The timestamp is milliseconds since the Unix epoch; 48 signed bits cover several
//! thousand years either side of it.

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::errors::DigestError;

pub const TIMESTAMP_LEN: usize = 6;
pub const HASH_LEN: usize = 16;
pub const SIZE_LEN: usize = 4;

/// Encoded width of a [`Digest`].
pub const DIGEST_LEN: usize = TIMESTAMP_LEN + HASH_LEN + SIZE_LEN;

const TIMESTAMP_MAX: i64 = (1 << 47) - 1;
const TIMESTAMP_MIN: i64 = -(1 << 47);

/// Freshness fingerprint of a stored value: when it was written, its MD5 and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest {
    timestamp: i64,
    content_hash: [u8; HASH_LEN],
    size: u32,
}

impl Digest {
    pub fn new(
        timestamp: i64,
        content_hash: [u8; HASH_LEN],
        size: u32,
    ) -> Result<Self, DigestError> {
        if !(TIMESTAMP_MIN..=TIMESTAMP_MAX).contains(&timestamp) {
            return Err(DigestError::TimestampOutOfRange(timestamp));
        }

        Ok(Digest {
            timestamp,
            content_hash,
            size,
        })
    }

    /// Fingerprint `payload` as written at `timestamp`.
    pub fn of(payload: &[u8], timestamp: i64) -> Result<Self, DigestError> {
        let size =
            u32::try_from(payload.len()).map_err(|_| DigestError::PayloadTooLarge(payload.len()))?;

        Self::new(timestamp, md5::compute(payload).0, size)
    }

    /// Fingerprint `payload` as written now.
    pub fn of_now(payload: &[u8]) -> Result<Self, DigestError> {
        Self::of(payload, now_millis())
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn content_hash(&self) -> &[u8; HASH_LEN] {
        &self.content_hash
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Whether `payload` hashes to this digest's content hash.
    pub fn matches(&self, payload: &[u8]) -> bool {
        md5::compute(payload).0 == self.content_hash
    }

    pub fn encode(&self) -> [u8; DIGEST_LEN] {
        let mut buf = [0u8; DIGEST_LEN];

        let ts = self.timestamp.to_le_bytes();
        buf[..TIMESTAMP_LEN].copy_from_slice(&ts[..TIMESTAMP_LEN]);
        buf[TIMESTAMP_LEN..TIMESTAMP_LEN + HASH_LEN].copy_from_slice(&self.content_hash);
        buf[TIMESTAMP_LEN + HASH_LEN..].copy_from_slice(&self.size.to_le_bytes());

        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DigestError> {
        if bytes.len() != DIGEST_LEN {
            return Err(DigestError::InvalidLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }

        // Sign-extend the 48-bit timestamp.
        let fill = if bytes[TIMESTAMP_LEN - 1] & 0x80 != 0 {
            0xff
        } else {
            0x00
        };
        let mut ts = [fill; 8];
        ts[..TIMESTAMP_LEN].copy_from_slice(&bytes[..TIMESTAMP_LEN]);

        let mut content_hash = [0u8; HASH_LEN];
        content_hash.copy_from_slice(&bytes[TIMESTAMP_LEN..TIMESTAMP_LEN + HASH_LEN]);

        let mut size = [0u8; SIZE_LEN];
        size.copy_from_slice(&bytes[TIMESTAMP_LEN + HASH_LEN..]);

        Ok(Digest {
            timestamp: i64::from_le_bytes(ts),
            content_hash,
            size: u32::from_le_bytes(size),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Digest(ts={}, md5=", self.timestamp)?;
        for b in self.content_hash.iter() {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ", size={})", self.size)
    }
}

/// Decide whether a cached copy must be re-fetched, given the remote index digest.
///
/// - No local copy: fetch.
/// - Same content hash: never fetch, whatever the timestamps say.
/// - Different hash: fetch only if the remote copy is strictly newer. A newer local copy
///   is kept; concurrent writers are resolved by last-writer-wins.
pub fn needs_hydration(local: Option<&Digest>, remote: &Digest) -> bool {
    let Some(local) = local else {
        return true;
    };

    if local.content_hash == remote.content_hash {
        return false;
    }

    remote.timestamp > local.timestamp
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
