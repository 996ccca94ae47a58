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

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use futures::TryStreamExt;
use log::debug;
use log::info;
use log::warn;

use crate::errors::DbmError;
use crate::errors::OpenError;
use crate::engine::RemoteSide;
use crate::engine::SyncEngine;
use crate::local_store::LocalStore;
use crate::metadata;
use crate::metadata::Metadata;
use crate::options::OpenFlag;
use crate::options::OpenOptions;
use crate::options::StorePaths;
use crate::remote;
use crate::remote::ListParams;
use crate::remote::RemoteTransport;
use crate::remote_index::RemoteIndex;
use crate::task_pool::KeyedStream;
use crate::task_pool::TaskPool;
use crate::TypeConfig;

/// Outcome of [`Dbm::reindex`].
#[derive(Debug, Default)]
pub struct ReindexReport {
    /// Keys whose objects were downloaded and indexed.
    pub indexed: usize,

    /// Keys dropped from the index because their objects no longer exist.
    pub removed: usize,

    /// Keys that could not be fetched; they keep their previous index entry.
    pub failed: Vec<(String, DbmError)>,
}

/// A persistent string-key to byte-value mapping, cached locally and stored remotely.
///
/// Reads are served from the local store when its copy is as fresh as the remote index
/// says; otherwise the object is downloaded first. Writes go to both sides immediately;
/// the index and metadata are published to the remote on [`Dbm::sync`] and
/// [`Dbm::close`].
///
/// Without a remote transport the mapping is purely local.
pub struct Dbm<C>
where C: TypeConfig
{
    engine: Arc<SyncEngine<C>>,
    pool: TaskPool<C>,
    flag: OpenFlag,
}

impl<C> fmt::Display for Dbm<C>
where C: TypeConfig
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.engine)
    }
}

impl<C> Dbm<C>
where C: TypeConfig
{
    /// Open the store whose metadata lives at `path`.
    ///
    /// The local metadata is reconciled with the remote copy at `options.base_key`: if
    /// the remote is newer or the local copy is missing, the remote index is downloaded
    /// again, otherwise the local copy of the index is used.
    pub async fn open(
        path: impl AsRef<Path>,
        remote: Option<C::Remote>,
        options: OpenOptions,
    ) -> Result<Self, DbmError> {
        static UNIQ: AtomicU64 = AtomicU64::new(0);
        let uniq = UNIQ.fetch_add(1, atomic::Ordering::SeqCst);

        let paths = StorePaths::new(path);
        let flag = options.flag;
        let index_key = options.index_key();

        info!(
            "Dbm({})[uniq={}]: open {} flag={} remote={}",
            options.name,
            uniq,
            paths.meta.display(),
            flag,
            remote.is_some()
        );

        if let Some(r) = &remote {
            if flag.is_writable() && !r.writable() {
                return Err(OpenError::RemoteNotWritable.into());
            }
        }

        if flag == OpenFlag::New {
            paths.remove_all()?;
        }
        paths.create_parent()?;

        let local_meta = Metadata::load_local(&paths.meta)?;

        let remote_meta = match &remote {
            Some(r) => Metadata::fetch_remote(r, &options.base_key).await?,
            None => None,
        };
        let remote_has_meta = remote_meta.is_some();

        if local_meta.is_none() && !remote_has_meta && !flag.creates() {
            return Err(OpenError::StoreNotFound(paths.meta.clone()).into());
        }

        let reconciled = metadata::reconcile(local_meta, remote_meta);
        let meta = match reconciled.metadata {
            Some(m) => m,
            None => Metadata::new(options.local_data.clone(), options.codec.clone()),
        };

        if meta.value_codec != options.codec {
            return Err(OpenError::CodecMismatch {
                stored: meta.value_codec.to_string(),
                requested: options.codec.to_string(),
            }
            .into());
        }

        let remote = match remote {
            None => None,
            Some(transport) => {
                let index = if reconciled.download_index {
                    download_index(&transport, &index_key).await?
                } else {
                    RemoteIndex::load(&paths.index)?
                };

                // A store created here is published on the first sync.
                if !remote_has_meta && flag.is_writable() {
                    index.mark_dirty();
                }

                Some(RemoteSide {
                    transport,
                    index,
                    base_key: options.base_key.clone(),
                    index_key,
                })
            }
        };

        let local = C::Local::open(&paths.data, &meta.local_data)?;

        let engine = SyncEngine::new(
            options.name.clone(),
            uniq,
            local,
            remote,
            !flag.is_writable(),
            meta,
            paths,
        );
        engine.save_local()?;

        let pool = TaskPool::new(options.worker_count, format!("{}-{}", options.name, uniq));

        let dbm = Dbm {
            engine: Arc::new(engine),
            pool,
            flag,
        };

        info!("{}: opened, {} keys", dbm, dbm.engine.len()?);
        Ok(dbm)
    }

    pub fn flag(&self) -> OpenFlag {
        self.flag
    }

    pub fn is_read_only(&self) -> bool {
        self.engine.is_read_only()
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    /// A copy of the current metadata document.
    pub fn metadata(&self) -> Metadata {
        self.engine.metadata()
    }

    /// Get the value of `key`, downloading it if the local copy is missing or stale.
    ///
    /// Returns `None` if the key does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DbmError> {
        self.engine.get(key).await
    }

    /// Like [`Dbm::get`] but a missing key is [`DbmError::NotFound`].
    pub async fn get_strict(&self, key: &str) -> Result<Vec<u8>, DbmError> {
        match self.engine.get(key).await? {
            Some(v) => Ok(v),
            None => Err(DbmError::NotFound(key.to_string())),
        }
    }

    pub async fn get_or(&self, key: &str, default: Vec<u8>) -> Result<Vec<u8>, DbmError> {
        Ok(self.engine.get(key).await?.unwrap_or(default))
    }

    pub async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), DbmError> {
        self.engine.set(key, value).await
    }

    /// Delete `key`, returning whether it existed.
    ///
    /// The remote object is removed with the next batched delete, at the latest on
    /// [`Dbm::sync`].
    pub async fn delete(&self, key: &str) -> Result<bool, DbmError> {
        self.engine.delete(key).await
    }

    /// Delete `keys` and flush the remote deletes; returns the number of keys that
    /// existed.
    pub async fn delete_many<I>(&self, keys: I) -> Result<usize, DbmError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut existed = 0;
        for key in keys {
            if self.engine.delete(key.as_ref()).await? {
                existed += 1;
            }
        }

        let calls = self.engine.flush_deletes().await?;
        debug!("{}: delete_many: {} existed, {} remote calls", self, existed, calls);

        Ok(existed)
    }

    pub async fn contains(&self, key: &str) -> Result<bool, DbmError> {
        self.engine.contains(key).await
    }

    /// All keys: the remote index if a remote is configured, otherwise the local store.
    pub fn keys(&self) -> Result<Vec<String>, DbmError> {
        self.engine.keys()
    }

    pub fn len(&self) -> Result<usize, DbmError> {
        self.engine.len()
    }

    pub fn is_empty(&self) -> Result<bool, DbmError> {
        Ok(self.engine.len()? == 0)
    }

    /// Get `keys` (all keys if `None`) concurrently on the worker pool.
    ///
    /// Results arrive in completion order; each key has its own result.
    pub fn items(
        &self,
        keys: Option<Vec<String>>,
    ) -> Result<KeyedStream<String, Result<Option<Vec<u8>>, DbmError>>, DbmError> {
        self.engine.ensure_open()?;

        let keys = match keys {
            Some(keys) => keys,
            None => self.engine.keys()?,
        };

        let engine = self.engine.clone();
        let strm = self.pool.map_unordered(keys, move |key: String| {
            let engine = engine.clone();
            async move { engine.get(&key).await }
        });

        Ok(strm)
    }

    /// Like [`Dbm::items`] without the keys.
    pub fn values(
        &self,
        keys: Option<Vec<String>>,
    ) -> Result<BoxStream<'static, Result<Option<Vec<u8>>, DbmError>>, DbmError> {
        let strm = self.items(keys)?;
        Ok(strm.map(|(_k, v)| v).boxed())
    }

    /// Set many entries concurrently on the worker pool.
    ///
    /// A key given more than once is written once, with its last value.
    pub fn update<I>(&self, pairs: I) -> Result<KeyedStream<String, Result<(), DbmError>>, DbmError>
    where I: IntoIterator<Item = (String, Vec<u8>)> {
        self.engine.ensure_open()?;
        if self.engine.is_read_only() {
            return Err(DbmError::ReadOnly("update".to_string()));
        }

        let values: HashMap<String, Vec<u8>> = pairs.into_iter().collect();
        let keys: Vec<String> = values.keys().cloned().collect();
        let values = Arc::new(parking_lot::Mutex::new(values));

        let engine = self.engine.clone();
        let strm = self.pool.map_unordered(keys, move |key: String| {
            let engine = engine.clone();
            let value = values.lock().remove(&key).unwrap_or_default();
            async move { engine.set(&key, value).await }
        });

        Ok(strm)
    }

    /// Remove every entry, locally and remotely. Requires `confirm`.
    pub async fn clear(&self, confirm: bool) -> Result<(), DbmError> {
        self.engine.clear(confirm).await
    }

    /// Rebuild the index from the remote objects under `prefix`.
    ///
    /// Every listed object is downloaded on the worker pool and indexed with the digest
    /// of its content and upload time. Indexed keys under `prefix` that are no longer
    /// listed are dropped. The new index is published on the next sync.
    pub async fn reindex(&self, prefix: &str) -> Result<ReindexReport, DbmError> {
        self.engine.ensure_open()?;
        if self.engine.is_read_only() {
            return Err(DbmError::ReadOnly("reindex".to_string()));
        }

        let Some(remote) = self.engine.writable_remote() else {
            warn!("{}: reindex without a remote is a no-op", self);
            return Ok(ReindexReport::default());
        };

        let listed: Vec<String> = remote::list(&remote.transport, ListParams::prefix(prefix))
            .map_ok(|info| info.key)
            .try_filter(|key| futures::future::ready(!self.engine.is_reserved(key)))
            .try_collect()
            .await
            .map_err(|e| e.context(format!("reindex: list {:?}", prefix)))?;

        info!("{}: reindex {:?}: {} objects listed", self, prefix, listed.len());

        let listed_set: HashSet<String> = listed.iter().cloned().collect();

        let mut report = ReindexReport::default();

        for key in remote.index.keys_with_prefix(prefix) {
            if !listed_set.contains(&key) {
                self.engine.forget(&key)?;
                report.removed += 1;
            }
        }

        let engine = self.engine.clone();
        let mut strm = self.pool.map_unordered(listed, move |key: String| {
            let engine = engine.clone();
            async move { engine.refresh(&key).await }
        });

        while let Some((key, res)) = strm.next().await {
            match res {
                Ok(Some(_digest)) => report.indexed += 1,
                Ok(None) => report.removed += 1,
                Err(e) => {
                    warn!("{}: reindex {:?} failed: {}", self, key, e);
                    report.failed.push((key, e));
                }
            }
        }

        info!(
            "{}: reindex {:?}: indexed={} removed={} failed={}",
            self,
            prefix,
            report.indexed,
            report.removed,
            report.failed.len()
        );

        Ok(report)
    }

    /// Flush pending deletes, publish the index if it changed, and persist local state.
    pub async fn sync(&self) -> Result<(), DbmError> {
        self.engine.sync().await
    }

    /// Stop the worker pool, sync if writable and close the local store.
    ///
    /// With `force`, bulk operations that have not started are discarded. Closing a
    /// closed store does nothing.
    pub async fn close(&self, force: bool) -> Result<(), DbmError> {
        if self.engine.is_closed() {
            return Ok(());
        }

        self.pool.shutdown(force).await;
        self.engine.close().await
    }
}

/// Download the index blob; a store whose index was never published has an empty one.
async fn download_index<T>(transport: &T, key: &str) -> Result<RemoteIndex, DbmError>
where T: RemoteTransport + ?Sized {
    let Some((blob, _meta)) = remote::get_optional(transport, key)
        .await
        .map_err(|e| e.context(format!("download index: {}", key)))?
    else {
        info!("remote index {} not found, starting empty", key);
        return Ok(RemoteIndex::new());
    };

    let index = RemoteIndex::from_blob(&blob)?;
    info!("downloaded remote index {}: {} keys", key, index.len());
    Ok(index)
}
