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

//! The synchronization engine: local cache, remote objects and the remote index.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic;
use std::sync::atomic::AtomicBool;

use log::debug;
use log::error;
use log::info;
use log::warn;
use tokio::sync::Mutex;

use crate::digest::needs_hydration;
use crate::digest::Digest;
use crate::errors::DbmError;
use crate::errors::TransportError;
use crate::local_store::LocalStore;
use crate::metadata::Metadata;
use crate::options::StorePaths;
use crate::record::LocalRecord;
use crate::remote;
use crate::remote::ObjectId;
use crate::remote::RemoteTransport;
use crate::remote::MAX_DELETE_BATCH;
use crate::remote::STATUS_NOT_FOUND;
use crate::remote::STATUS_OK;
use crate::remote::UPLOAD_TIMESTAMP;
use crate::remote_index::RemoteIndex;
use crate::remote_index::MAX_KEY_LEN;
use crate::TypeConfig;

/// The remote half of a store: the transport and the index describing its objects.
pub(crate) struct RemoteSide<R> {
    pub(crate) transport: R,
    pub(crate) index: RemoteIndex,
    pub(crate) base_key: String,
    pub(crate) index_key: String,
}

/// Shared state of an open store.
///
/// Every operation takes `&self`: the local store serializes its own writes, the index
/// is behind a lock, and pending deletes and sync are guarded by async mutexes.
pub(crate) struct SyncEngine<C: TypeConfig> {
    pub(crate) name: String,
    pub(crate) uniq: u64,

    local: C::Local,
    remote: Option<RemoteSide<C::Remote>>,
    read_only: bool,

    metadata: parking_lot::Mutex<Metadata>,
    paths: StorePaths,

    /// Remote deletes not yet sent, flushed in batches.
    pending_deletes: Mutex<Vec<ObjectId>>,

    sync_lock: Mutex<()>,
    closed: AtomicBool,
}

impl<C> fmt::Display for SyncEngine<C>
where C: TypeConfig
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dbm({})[uniq={}]", self.name, self.uniq)
    }
}

impl<C> SyncEngine<C>
where C: TypeConfig
{
    pub(crate) fn new(
        name: String,
        uniq: u64,
        local: C::Local,
        remote: Option<RemoteSide<C::Remote>>,
        read_only: bool,
        metadata: Metadata,
        paths: StorePaths,
    ) -> Self {
        SyncEngine {
            name,
            uniq,
            local,
            remote,
            read_only,
            metadata: parking_lot::Mutex::new(metadata),
            paths,
            pending_deletes: Mutex::new(Vec::new()),
            sync_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(atomic::Ordering::Acquire)
    }

    pub(crate) fn metadata(&self) -> Metadata {
        self.metadata.lock().clone()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), DbmError> {
        if self.is_closed() {
            return Err(DbmError::Closed);
        }
        Ok(())
    }

    fn ensure_writable(&self, op: &str) -> Result<(), DbmError> {
        self.ensure_open()?;
        if self.read_only {
            return Err(DbmError::ReadOnly(op.to_string()));
        }
        Ok(())
    }

    /// The remote side, if this instance may modify it.
    pub(crate) fn writable_remote(&self) -> Option<&RemoteSide<C::Remote>> {
        if self.read_only {
            return None;
        }
        self.remote.as_ref()
    }

    /// The metadata document and the index blob live among the user's objects, and
    /// index entries store the key length in 16 bits.
    pub(crate) fn check_key(&self, key: &str) -> Result<(), DbmError> {
        if let Some(r) = &self.remote {
            if key == r.base_key || key == r.index_key {
                return Err(DbmError::ReservedKey(key.to_string()));
            }
            if key.len() > MAX_KEY_LEN {
                return Err(DbmError::KeyTooLong(key.len()));
            }
        }
        Ok(())
    }

    pub(crate) fn is_reserved(&self, key: &str) -> bool {
        self.check_key(key).is_err()
    }

    fn local_record(&self, key: &str) -> Result<Option<LocalRecord>, DbmError> {
        let Some(bytes) = self.local.get(key)? else {
            return Ok(None);
        };
        Ok(Some(LocalRecord::decode(bytes)?))
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DbmError> {
        self.ensure_open()?;
        self.check_key(key)?;

        let local = self.local_record(key)?;

        let Some(remote) = &self.remote else {
            return Ok(local.map(|r| r.payload));
        };

        // The index is authoritative for existence: a local record of a key deleted
        // elsewhere must not be resurrected.
        let Some(remote_digest) = remote.index.get(key) else {
            if local.is_some() {
                debug!("{}: get {:?}: not in remote index, ignoring local record", self, key);
            }
            return Ok(None);
        };

        let local_digest = local.as_ref().map(|r| r.digest);
        if !needs_hydration(local_digest.as_ref(), &remote_digest) {
            return Ok(local.map(|r| r.payload));
        }

        let payload = self.hydrate(remote, key, &remote_digest).await?;
        Ok(Some(payload))
    }

    /// Download `key` into the local store and return its payload.
    async fn hydrate(
        &self,
        remote: &RemoteSide<C::Remote>,
        key: &str,
        expected: &Digest,
    ) -> Result<Vec<u8>, DbmError> {
        debug!("{}: hydrate {:?}, remote digest {}", self, key, expected);

        let Some(record) = self.fetch(remote, key).await? else {
            error!(
                "{}: remote index lists {:?} but the object is missing",
                self, key
            );
            return Err(DbmError::Inconsistency(key.to_string()));
        };

        if !expected.matches(&record.payload) {
            warn!(
                "{}: hydrated {:?} does not match the index: got {}, indexed {}",
                self, key, record.digest, expected
            );
        }

        self.local.set(key, &record.encode())?;
        Ok(record.payload)
    }

    /// Fetch the remote object of `key` with a digest rebuilt from its upload time.
    ///
    /// Returns `None` if the object does not exist.
    async fn fetch(
        &self,
        remote: &RemoteSide<C::Remote>,
        key: &str,
    ) -> Result<Option<LocalRecord>, DbmError> {
        let ctx = || format!("get: {}", key);

        let resp = remote
            .transport
            .get(key)
            .await
            .map_err(|e| e.context(ctx()))?;

        match resp.status {
            STATUS_OK => {}
            STATUS_NOT_FOUND => return Ok(None),
            status => {
                error!("{}: get {:?}: unexpected status {}", self, key, status);
                let e = TransportError::status(status, "unexpected response status");
                return Err(e.context(ctx()).into());
            }
        }

        let timestamp = resp.meta.upload_timestamp();
        let payload = resp.read_all().await.map_err(|e| e.context(ctx()))?;
        let digest = Digest::of(&payload, timestamp)?;

        Ok(Some(LocalRecord::new(digest, payload)))
    }

    pub(crate) async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), DbmError> {
        self.ensure_writable("set")?;
        self.check_key(key)?;

        let digest = Digest::of_now(&value)?;
        let record = LocalRecord::new(digest, value);
        self.local.set(key, &record.encode())?;

        let Some(remote) = self.writable_remote() else {
            return Ok(());
        };

        // A queued delete of this key would remove the object being written.
        let dequeued = {
            let mut pending = self.pending_deletes.lock().await;
            let before = pending.len();
            pending.retain(|id| id.key != key);
            pending.len() != before
        };

        let mut user = BTreeMap::new();
        user.insert(UPLOAD_TIMESTAMP.to_string(), digest.timestamp().to_string());

        let put = remote.transport.put(key, record.payload, user).await;

        if let Err(e) = put {
            error!("{}: put {:?} failed: {}", self, key, e);
            if dequeued {
                self.pending_deletes.lock().await.push(ObjectId::new(key));
            }
            return Err(e.context(format!("put: {}", key)).into());
        }

        // Only an uploaded object may be listed in the index.
        remote.index.set(key, digest);

        debug!("{}: set {:?} {}", self, key, digest);
        Ok(())
    }

    /// Returns whether the key existed.
    pub(crate) async fn delete(&self, key: &str) -> Result<bool, DbmError> {
        self.ensure_writable("delete")?;
        self.check_key(key)?;

        let existed_locally = self.local.delete(key)?;

        let Some(remote) = self.writable_remote() else {
            return Ok(existed_locally);
        };

        if remote.index.delete(key).is_none() {
            return Ok(false);
        }

        let mut pending = self.pending_deletes.lock().await;
        pending.push(ObjectId::new(key));

        if pending.len() >= MAX_DELETE_BATCH {
            let batch = std::mem::take(&mut *pending);
            Self::send_deletes(remote, &mut pending, batch).await?;
        }

        Ok(true)
    }

    pub(crate) async fn contains(&self, key: &str) -> Result<bool, DbmError> {
        self.ensure_open()?;
        self.check_key(key)?;

        match &self.remote {
            Some(r) => Ok(r.index.contains(key)),
            None => Ok(self.local.contains(key)?),
        }
    }

    pub(crate) fn keys(&self) -> Result<Vec<String>, DbmError> {
        self.ensure_open()?;

        match &self.remote {
            Some(r) => Ok(r.index.keys()),
            None => Ok(self.local.keys()?),
        }
    }

    pub(crate) fn len(&self) -> Result<usize, DbmError> {
        self.ensure_open()?;

        match &self.remote {
            Some(r) => Ok(r.index.len()),
            None => Ok(self.local.len()? as usize),
        }
    }

    /// Remove every entry, locally and remotely.
    ///
    /// Only objects listed in the index are deleted: other objects under the same
    /// transport are left alone.
    pub(crate) async fn clear(&self, confirm: bool) -> Result<(), DbmError> {
        self.ensure_writable("clear")?;

        if !confirm {
            return Err(DbmError::ConfirmationRequired("clear".to_string()));
        }

        self.local.clear()?;

        let Some(remote) = self.writable_remote() else {
            info!("{}: cleared local store", self);
            return Ok(());
        };

        let keys = remote.index.clear();
        let n = keys.len();

        let mut pending = self.pending_deletes.lock().await;
        let mut batch = std::mem::take(&mut *pending);
        batch.extend(keys.into_iter().map(ObjectId::new));
        Self::send_deletes(remote, &mut pending, batch).await?;

        info!("{}: cleared {} keys", self, n);
        Ok(())
    }

    /// Send queued remote deletes; returns the number of remote calls.
    pub(crate) async fn flush_deletes(&self) -> Result<usize, DbmError> {
        self.ensure_open()?;

        let Some(remote) = self.writable_remote() else {
            return Ok(0);
        };

        self.flush_pending(remote).await
    }

    async fn flush_pending(&self, remote: &RemoteSide<C::Remote>) -> Result<usize, DbmError> {
        let mut pending = self.pending_deletes.lock().await;
        let batch = std::mem::take(&mut *pending);
        Self::send_deletes(remote, &mut pending, batch).await
    }

    /// On failure the batch is put back into `pending` to be retried by the next flush.
    async fn send_deletes(
        remote: &RemoteSide<C::Remote>,
        pending: &mut Vec<ObjectId>,
        batch: Vec<ObjectId>,
    ) -> Result<usize, DbmError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let n = batch.len();
        match remote::delete_in_chunks(&remote.transport, batch.clone()).await {
            Ok(calls) => {
                debug!("deleted {} remote objects in {} calls", n, calls);
                Ok(calls)
            }
            Err(e) => {
                pending.extend(batch);
                Err(e.context(format!("delete {} objects", n)).into())
            }
        }
    }

    /// Download `key` and record it in the index; a missing object is dropped from both
    /// the index and the local store.
    ///
    /// Returns the new digest, or `None` if the object does not exist.
    pub(crate) async fn refresh(&self, key: &str) -> Result<Option<Digest>, DbmError> {
        self.ensure_writable("reindex")?;
        self.check_key(key)?;

        let Some(remote) = self.writable_remote() else {
            return Ok(None);
        };

        let Some(record) = self.fetch(remote, key).await? else {
            remote.index.delete(key);
            self.local.delete(key)?;
            return Ok(None);
        };

        self.local.set(key, &record.encode())?;
        remote.index.set(key, record.digest);

        Ok(Some(record.digest))
    }

    /// Drop `key` from the index and the local store without touching the remote.
    pub(crate) fn forget(&self, key: &str) -> Result<(), DbmError> {
        if let Some(r) = &self.remote {
            r.index.delete(key);
        }
        self.local.delete(key)?;
        Ok(())
    }

    /// Persist everything: flush deletes, publish a changed index with fresh metadata,
    /// then save the local copies and make the local store durable.
    pub(crate) async fn sync(&self) -> Result<(), DbmError> {
        self.ensure_open()?;

        let _g = self.sync_lock.lock().await;
        self.sync_inner().await
    }

    async fn sync_inner(&self) -> Result<(), DbmError> {
        if let Some(remote) = self.writable_remote() {
            self.flush_pending(remote).await?;

            if remote.index.is_dirty() {
                // Cleared before serializing: a concurrent write re-dirties the index.
                remote.index.mark_clean();

                if let Err(e) = self.publish(remote).await {
                    remote.index.mark_dirty();
                    return Err(e);
                }
            }
        }

        self.save_local()?;
        self.local.sync()?;

        debug!("{}: synced", self);
        Ok(())
    }

    /// Upload the index blob, then the metadata that announces it.
    async fn publish(&self, remote: &RemoteSide<C::Remote>) -> Result<(), DbmError> {
        let blob = remote.index.serialize()?;
        let n = remote.index.len();

        remote
            .transport
            .put(&remote.index_key, blob, BTreeMap::new())
            .await
            .map_err(|e| e.context(format!("upload index: {}", remote.index_key)))?;

        let metadata = {
            let mut m = self.metadata.lock();
            m.touch();
            m.clone()
        };

        metadata
            .upload(&remote.transport, &remote.base_key)
            .await
            .map_err(|e| e.context(format!("upload metadata: {}", remote.base_key)))?;

        info!(
            "{}: published index of {} keys, last_modified={}",
            self, n, metadata.last_modified
        );
        Ok(())
    }

    pub(crate) fn save_local(&self) -> Result<(), DbmError> {
        self.metadata.lock().save_local(&self.paths.meta)?;

        if let Some(r) = &self.remote {
            r.index.save(&self.paths.index)?;
        }
        Ok(())
    }

    /// Sync if writable, then close the local store. Repeated calls are no-ops.
    ///
    /// The store is closed even if the final sync fails; the sync error is returned.
    pub(crate) async fn close(&self) -> Result<(), DbmError> {
        let _g = self.sync_lock.lock().await;

        if self.closed.swap(true, atomic::Ordering::AcqRel) {
            debug!("{}: already closed", self);
            return Ok(());
        }

        let synced = if self.read_only {
            Ok(())
        } else {
            self.sync_inner().await
        };

        if let Err(e) = &synced {
            error!("{}: final sync failed: {}", self, e);
        }

        self.local.close()?;
        info!("{}: closed", self);

        synced
    }
}
