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

//! The embedded local store that backs the cache.

use std::fmt;
use std::path::Path;

use log::debug;
use log::info;
use parking_lot::RwLock;
use redb::Database;
use redb::Durability;
use redb::ReadableTable;
use redb::ReadableTableMetadata;
use redb::TableDefinition;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::LocalStoreError;

/// Creation parameters of the local store, persisted in the metadata document so that a
/// store re-created from a remote copy is configured the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDataConfig {
    /// Capacity hint in bytes for the store's page cache.
    pub cache_size: usize,
}

impl Default for LocalDataConfig {
    fn default() -> Self {
        LocalDataConfig {
            cache_size: 16 * 1024 * 1024,
        }
    }
}

/// Ordered string-key to byte-value store with atomic single-key operations.
pub trait LocalStore
where
    Self: Sized,
    Self: Send + Sync + 'static,
{
    /// Open the store at `path`, creating it with `config` if it does not exist.
    fn open(path: &Path, config: &LocalDataConfig) -> Result<Self, LocalStoreError>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LocalStoreError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), LocalStoreError>;

    /// Remove `key`, returning whether it was present.
    fn delete(&self, key: &str) -> Result<bool, LocalStoreError>;

    fn contains(&self, key: &str) -> Result<bool, LocalStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// All keys in ascending order.
    fn keys(&self) -> Result<Vec<String>, LocalStoreError>;

    fn len(&self) -> Result<u64, LocalStoreError>;

    fn is_empty(&self) -> Result<bool, LocalStoreError> {
        Ok(self.len()? == 0)
    }

    fn clear(&self) -> Result<(), LocalStoreError>;

    /// Make every completed write durable.
    fn sync(&self) -> Result<(), LocalStoreError>;

    /// Release the store. Calling it again is a no-op.
    fn close(&self) -> Result<(), LocalStoreError>;
}

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// [`LocalStore`] over a single-table redb database file.
///
/// Single-key writes are committed without fsync; [`LocalStore::sync`] issues a durable
/// commit, which persists every earlier commit as well.
pub struct RedbStore {
    db: RwLock<Option<Database>>,
    path: String,
}

impl fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RedbStore").field("path", &self.path).finish()
    }
}

impl RedbStore {
    fn with_db<T>(
        &self,
        f: impl FnOnce(&Database) -> Result<T, LocalStoreError>,
    ) -> Result<T, LocalStoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(LocalStoreError::Closed)?;
        f(db)
    }

    fn write<T>(
        &self,
        durability: Durability,
        f: impl FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>) -> Result<T, LocalStoreError>,
    ) -> Result<T, LocalStoreError> {
        self.with_db(|db| {
            let mut txn = db.begin_write()?;
            txn.set_durability(durability);
            let t = {
                let mut table = txn.open_table(RECORDS)?;
                f(&mut table)?
            };
            txn.commit()?;
            Ok(t)
        })
    }
}

impl LocalStore for RedbStore {
    fn open(path: &Path, config: &LocalDataConfig) -> Result<Self, LocalStoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = redb::Builder::new()
            .set_cache_size(config.cache_size)
            .create(path)?;

        // Create the table eagerly so that read transactions never miss it.
        let txn = db.begin_write()?;
        {
            let _t = txn.open_table(RECORDS)?;
        }
        txn.commit()?;

        info!("RedbStore opened at {}", path.display());

        Ok(RedbStore {
            db: RwLock::new(Some(db)),
            path: path.display().to_string(),
        })
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, LocalStoreError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS)?;
            let v = table.get(key)?.map(|g| g.value().to_vec());
            Ok(v)
        })
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), LocalStoreError> {
        self.write(Durability::None, |table| {
            table.insert(key, value)?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<bool, LocalStoreError> {
        self.write(Durability::None, |table| {
            let prev = table.remove(key)?;
            Ok(prev.is_some())
        })
    }

    fn keys(&self) -> Result<Vec<String>, LocalStoreError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS)?;
            let mut keys = Vec::new();
            for entry in table.iter()? {
                let (k, _v) = entry?;
                keys.push(k.value().to_string());
            }
            Ok(keys)
        })
    }

    fn len(&self) -> Result<u64, LocalStoreError> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(RECORDS)?;
            Ok(table.len()?)
        })
    }

    fn clear(&self) -> Result<(), LocalStoreError> {
        self.write(Durability::None, |table| {
            table.retain(|_k, _v| false)?;
            Ok(())
        })
    }

    fn sync(&self) -> Result<(), LocalStoreError> {
        debug!("RedbStore({}) sync", self.path);
        self.write(Durability::Immediate, |_table| Ok(()))
    }

    fn close(&self) -> Result<(), LocalStoreError> {
        let mut guard = self.db.write();
        if guard.is_none() {
            return Ok(());
        }

        // Persist non-durable commits before the handle goes away.
        if let Some(db) = guard.as_ref() {
            let mut txn = db.begin_write()?;
            txn.set_durability(Durability::Immediate);
            txn.commit()?;
        }

        *guard = None;
        info!("RedbStore({}) closed", self.path);
        Ok(())
    }
}
