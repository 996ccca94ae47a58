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

//! MemoryTransport: an in-memory object store for tests.
//!
//! Clones share one bucket, so several mapping instances built on clones of the same
//! transport see each other's writes, like clients of one remote store. Every call is
//! counted so tests can assert how often the remote was touched.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::digest::now_millis;
use crate::errors::TransportError;
use crate::remote::GetResponse;
use crate::remote::ListPage;
use crate::remote::ListParams;
use crate::remote::ObjectId;
use crate::remote::ObjectInfo;
use crate::remote::ObjectMeta;
use crate::remote::RemoteTransport;
use crate::remote::MAX_DELETE_BATCH;
use crate::remote::STATUS_NOT_FOUND;
use crate::remote::UPLOAD_TIMESTAMP;

#[derive(Debug, Clone)]
struct Object {
    body: Vec<u8>,
    meta: ObjectMeta,
}

/// Number of calls received, per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub gets: usize,
    pub puts: usize,
    pub list_pages: usize,
    pub delete_batches: usize,
    /// Objects named in delete calls.
    pub deleted: usize,
}

#[derive(Debug)]
pub struct State {
    objects: BTreeMap<String, Object>,
    /// Status codes forced for `get` of specific keys.
    status_overrides: BTreeMap<String, u16>,
    /// Status codes with which `put` of specific keys fails.
    put_failures: BTreeMap<String, u16>,
    page_size: usize,
    pub stats: CallStats,
}

#[derive(Debug, Clone)]
pub struct MemoryTransport {
    pub state: Arc<Mutex<State>>,
    writable: bool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                status_overrides: BTreeMap::new(),
                put_failures: BTreeMap::new(),
                page_size: 1000,
                stats: CallStats::default(),
            })),
            writable: true,
        }
    }

    /// A handle on the same bucket that refuses writes, like a public HTTP origin.
    pub fn read_only(&self) -> Self {
        Self {
            state: self.state.clone(),
            writable: false,
        }
    }

    pub async fn set_page_size(&self, page_size: usize) {
        self.state.lock().await.page_size = page_size.max(1);
    }

    /// Answer every `get` of `key` with `status` until cleared.
    pub async fn force_status(&self, key: &str, status: u16) {
        let mut state = self.state.lock().await;
        state.status_overrides.insert(key.to_string(), status);
    }

    pub async fn clear_forced_status(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.status_overrides.remove(key);
    }

    /// Make every `put` of `key` fail with `status` until cleared.
    pub async fn fail_puts(&self, key: &str, status: u16) {
        self.state.lock().await.put_failures.insert(key.to_string(), status);
    }

    pub async fn clear_failed_puts(&self, key: &str) {
        self.state.lock().await.put_failures.remove(key);
    }

    pub async fn stats(&self) -> CallStats {
        self.state.lock().await.stats.clone()
    }

    pub async fn reset_stats(&self) {
        self.state.lock().await.stats = CallStats::default();
    }

    /// Body of a stored object, bypassing call accounting.
    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.objects.get(key).map(|o| o.body.clone())
    }

    /// Keys of all stored objects, bypassing call accounting.
    pub async fn object_keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.objects.keys().cloned().collect()
    }

    /// Store an object as an out-of-band writer would, without call accounting.
    ///
    /// `upload_timestamp` is recorded as user metadata when given.
    pub async fn insert_object(&self, key: &str, body: &[u8], upload_timestamp: Option<i64>) {
        let mut user = BTreeMap::new();
        if let Some(ts) = upload_timestamp {
            user.insert(UPLOAD_TIMESTAMP.to_string(), ts.to_string());
        }

        let mut state = self.state.lock().await;
        state.objects.insert(key.to_string(), Object {
            body: body.to_vec(),
            meta: ObjectMeta {
                last_modified: now_millis(),
                content_type: None,
                user,
            },
        });
    }

    /// Remove an object out of band, without call accounting.
    pub async fn remove_object(&self, key: &str) -> bool {
        self.state.lock().await.objects.remove(key).is_some()
    }
}

#[async_trait::async_trait]
impl RemoteTransport for MemoryTransport {
    async fn get(&self, key: &str) -> Result<GetResponse, TransportError> {
        let mut state = self.state.lock().await;
        state.stats.gets += 1;

        if let Some(status) = state.status_overrides.get(key) {
            return Ok(GetResponse::with_status(*status));
        }

        match state.objects.get(key) {
            Some(obj) => Ok(GetResponse::found(obj.body.clone(), obj.meta.clone())),
            None => Ok(GetResponse::with_status(STATUS_NOT_FOUND)),
        }
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        user_meta: BTreeMap<String, String>,
    ) -> Result<(), TransportError> {
        if !self.writable {
            return Err(TransportError::status(403, "transport is read-only"));
        }

        let mut state = self.state.lock().await;
        state.stats.puts += 1;

        if let Some(status) = state.put_failures.get(key) {
            return Err(TransportError::status(*status, "put rejected"));
        }
        state.objects.insert(key.to_string(), Object {
            body,
            meta: ObjectMeta {
                last_modified: now_millis(),
                content_type: Some("application/octet-stream".to_string()),
                user: user_meta,
            },
        });
        Ok(())
    }

    async fn list_page(
        &self,
        params: &ListParams,
        continuation: Option<String>,
    ) -> Result<ListPage, TransportError> {
        let mut state = self.state.lock().await;
        state.stats.list_pages += 1;

        let prefix = params.prefix.clone().unwrap_or_default();
        let after = continuation.or_else(|| params.start_after.clone());

        let mut objects = Vec::new();
        let mut next = None;

        for (key, obj) in state.objects.iter() {
            if !key.starts_with(&prefix) {
                continue;
            }
            if let Some(after) = &after {
                if key <= after {
                    continue;
                }
            }
            if let Some(delim) = &params.delimiter {
                // Keys below a delimiter are grouped away, not listed.
                if !delim.is_empty() && key[prefix.len()..].contains(delim.as_str()) {
                    continue;
                }
            }

            if objects.len() == state.page_size {
                next = objects.last().map(|o: &ObjectInfo| o.key.clone());
                break;
            }

            objects.push(ObjectInfo {
                key: key.clone(),
                size: obj.body.len() as u64,
                last_modified: obj.meta.last_modified,
            });
        }

        Ok(ListPage { objects, next })
    }

    async fn delete_batch(&self, ids: Vec<ObjectId>) -> Result<(), TransportError> {
        if !self.writable {
            return Err(TransportError::status(403, "transport is read-only"));
        }

        if ids.len() > MAX_DELETE_BATCH {
            return Err(TransportError::status(
                400,
                format!("{} objects in one delete call", ids.len()),
            ));
        }

        let mut state = self.state.lock().await;
        state.stats.delete_batches += 1;
        state.stats.deleted += ids.len();

        for id in ids {
            state.objects.remove(&id.key);
        }
        Ok(())
    }

    fn writable(&self) -> bool {
        self.writable
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::remote;

    #[tokio::test]
    async fn test_put_get_and_missing() {
        let t = MemoryTransport::new();
        t.put("a", b"1".to_vec(), BTreeMap::new()).await.unwrap();

        let (body, _meta) = remote::get_optional(&t, "a").await.unwrap().unwrap();
        assert_eq!(body, b"1".to_vec());
        assert!(remote::get_optional(&t, "b").await.unwrap().is_none());

        assert_eq!(t.stats().await.gets, 2);
        assert_eq!(t.stats().await.puts, 1);
    }

    #[tokio::test]
    async fn test_listing_is_paginated_transparently() {
        let t = MemoryTransport::new();
        t.set_page_size(2).await;
        for k in ["p/1", "p/2", "p/3", "p/4", "p/5", "q/1"] {
            t.insert_object(k, k.as_bytes(), None).await;
        }

        let keys: Vec<String> = remote::list(&t, ListParams::prefix("p/"))
            .map_ok(|o| o.key)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(keys, vec!["p/1", "p/2", "p/3", "p/4", "p/5"]);
        assert_eq!(t.stats().await.list_pages, 3);
    }

    #[tokio::test]
    async fn test_listing_start_after_and_delimiter() {
        let t = MemoryTransport::new();
        for k in ["a", "b", "c/1", "d"] {
            t.insert_object(k, b"", None).await;
        }

        let params = ListParams {
            start_after: Some("a".to_string()),
            delimiter: Some("/".to_string()),
            ..Default::default()
        };
        let keys: Vec<String> = remote::list(&t, params)
            .map_ok(|o| o.key)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(keys, vec!["b", "d"]);
    }

    #[tokio::test]
    async fn test_delete_batches_are_chunked() {
        let t = MemoryTransport::new();
        let ids: Vec<ObjectId> = (0..2500).map(|i| ObjectId::new(format!("k{}", i))).collect();
        for id in ids.iter().take(10) {
            t.insert_object(&id.key, b"x", None).await;
        }

        let calls = remote::delete_in_chunks(&t, ids).await.unwrap();
        assert_eq!(calls, 3);

        let stats = t.stats().await;
        assert_eq!(stats.delete_batches, 3);
        assert_eq!(stats.deleted, 2500);
        assert!(t.object_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_only_handle_rejects_writes() {
        let t = MemoryTransport::new();
        let ro = t.read_only();

        assert!(!ro.writable());
        let err = ro.put("a", vec![], BTreeMap::new()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(403));
    }

    #[tokio::test]
    async fn test_forced_status() {
        let t = MemoryTransport::new();
        t.insert_object("a", b"1", None).await;
        t.force_status("a", 503).await;

        let err = remote::get_optional(&t, "a").await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));

        t.clear_forced_status("a").await;
        assert!(remote::get_optional(&t, "a").await.unwrap().is_some());
    }
}
