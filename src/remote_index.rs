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

//! Remote-side table of key digests.
//!
//! The index lets a client learn the full remote key set, and the freshness digest of every
//! key, with a single download instead of one remote probe per key.
//!
//! Blob layout, integers little-endian:
//!
//! ```text
//! "DBMIDX01" | count: u32 | count * ( key_len: u16 | key: utf-8 | digest: 26 bytes )
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use log::debug;
use log::info;
use parking_lot::RwLock;

use crate::digest::Digest;
use crate::digest::DIGEST_LEN;
use crate::errors::DigestError;

const MAGIC: &[u8; 8] = b"DBMIDX01";

/// Longest key an index entry can hold: its length is stored as a `u16`.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Key to [`Digest`] map mirroring the remote index blob.
///
/// Mutations mark the index dirty; the owner uploads [`RemoteIndex::serialize`] and
/// calls [`RemoteIndex::mark_clean`] when it syncs.
#[derive(Debug, Default)]
pub struct RemoteIndex {
    entries: RwLock<BTreeMap<String, Digest>>,
    dirty: AtomicBool,
}

impl RemoteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Digest> {
        self.entries.read().get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn set(&self, key: impl ToString, digest: Digest) {
        self.entries.write().insert(key.to_string(), digest);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn delete(&self, key: &str) -> Option<Digest> {
        let prev = self.entries.write().remove(key);
        if prev.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        prev
    }

    /// Remove every entry, returning the removed keys.
    pub fn clear(&self) -> Vec<String> {
        let old = std::mem::take(&mut *self.entries.write());
        self.dirty.store(true, Ordering::Release);
        old.into_keys().collect()
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    /// Force the next sync to upload the index, e.g. after a failed upload.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn serialize(&self) -> Result<Vec<u8>, DigestError> {
        let entries = self.entries.read();

        let count = u32::try_from(entries.len())
            .map_err(|_| DigestError::MalformedIndex(format!("{} entries", entries.len())))?;

        let mut buf = Vec::with_capacity(12 + entries.len() * (DIGEST_LEN + 34));
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&count.to_le_bytes());

        for (key, digest) in entries.iter() {
            let key_len = u16::try_from(key.len())
                .map_err(|_| DigestError::MalformedIndex(format!("key of {} bytes", key.len())))?;

            buf.extend_from_slice(&key_len.to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(&digest.encode());
        }

        Ok(buf)
    }

    /// Replace the whole index with the content of a downloaded blob.
    ///
    /// The index is clean afterwards: it equals the remote copy.
    pub fn download(&self, blob: &[u8]) -> Result<(), DigestError> {
        let entries = parse_blob(blob)?;
        info!("RemoteIndex: loaded {} entries", entries.len());

        *self.entries.write() = entries;
        self.mark_clean();
        Ok(())
    }

    pub fn from_blob(blob: &[u8]) -> Result<Self, DigestError> {
        let index = Self::new();
        index.download(blob)?;
        Ok(index)
    }

    /// Persist a local copy of the index.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let blob = self
            .serialize()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        debug!("RemoteIndex: saving {} bytes to {}", blob.len(), path.display());
        std::fs::write(path, blob)
    }

    /// Load the local copy written by [`RemoteIndex::save`]; a missing file yields an
    /// empty index.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let blob = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e),
        };

        Self::from_blob(&blob).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

fn parse_blob(blob: &[u8]) -> Result<BTreeMap<String, Digest>, DigestError> {
    let malformed = |what: &str| DigestError::MalformedIndex(what.to_string());

    let mut rest = blob
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| malformed("bad magic"))?;

    let count = u32::from_le_bytes(take::<4>(&mut rest).ok_or_else(|| malformed("no count"))?);

    let mut entries = BTreeMap::new();

    for i in 0..count {
        let key_len = u16::from_le_bytes(
            take::<2>(&mut rest).ok_or_else(|| malformed(&format!("entry {}: no key length", i)))?,
        ) as usize;

        if rest.len() < key_len + DIGEST_LEN {
            return Err(malformed(&format!("entry {}: truncated", i)));
        }

        let (key, tail) = rest.split_at(key_len);
        let (digest, tail) = tail.split_at(DIGEST_LEN);
        rest = tail;

        let key = std::str::from_utf8(key)
            .map_err(|e| malformed(&format!("entry {}: key is not utf-8: {}", i, e)))?;

        entries.insert(key.to_string(), Digest::decode(digest)?);
    }

    if !rest.is_empty() {
        return Err(malformed(&format!("{} trailing bytes", rest.len())));
    }

    Ok(entries)
}

fn take<const N: usize>(rest: &mut &[u8]) -> Option<[u8; N]> {
    if rest.len() < N {
        return None;
    }
    let (head, tail) = rest.split_at(N);
    *rest = tail;
    head.try_into().ok()
}
