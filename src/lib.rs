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

#![allow(clippy::uninlined_format_args)]

//! A dbm-style persistent key-value mapping, cached in a local embedded store and kept
//! in a remote object store.
//!
//! Features:
//! - Local reads when the cached copy is fresh, hydration from the remote otherwise
//! - Per-key freshness through a compact timestamp + content hash digest
//! - A remote index of digests, so existence and freshness need no per-key probes
//! - Batched remote deletes
//! - Bounded concurrent bulk reads and writes
//! - A metadata document reconciled on open
//!
//! # Store Layout
//!
//! ```text
//! local:   P                 metadata (JSON)
//!          P.data            embedded store: key -> digest ++ payload
//!          P.remote_keys     last known copy of the remote index
//!
//! remote:  <base_key>              metadata (JSON)
//!          <base_key>.remote_keys  index blob: key -> digest
//!          <key>                   one object per entry
//! ```
//!
//! # Read Path
//!
//! ```text
//! get(k) ---> remote index has k? --no--> None
//!                     |
//!                    yes: remote digest R
//!                     v
//!             local digest L == R, or L newer? --yes--> local payload
//!                     |
//!                     no
//!                     v
//!             download k, store L' locally ---> payload
//! ```
//!
//! Without a remote transport the mapping is purely local.
//!
//! # Consistency
//!
//! Last writer wins by upload time. The index and metadata are published on
//! [`Dbm::sync`] and [`Dbm::close`]; other clients see new keys once they re-open
//! after a publish.

mod codec;
mod dbm;
mod digest;
mod engine;
mod kv_map;
mod local_store;
mod metadata;
mod options;
mod record;
mod remote_index;
mod task_pool;
mod type_config;
mod typed_dbm;

pub use codec::Codec;
pub use codec::CodecId;
pub use dbm::Dbm;
pub use dbm::ReindexReport;
pub use digest::needs_hydration;
pub use digest::now_millis;
pub use digest::Digest;
pub use digest::DIGEST_LEN;
pub use kv_map::KvMap;
pub use local_store::LocalDataConfig;
pub use local_store::LocalStore;
pub use local_store::RedbStore;
pub use metadata::reconcile;
pub use metadata::Metadata;
pub use metadata::Reconciled;
pub use options::OpenFlag;
pub use options::OpenOptions;
pub use options::StorePaths;
pub use record::LocalRecord;
pub use remote_index::RemoteIndex;
pub use task_pool::KeyedStream;
pub use task_pool::TaskPool;
pub use type_config::TypeConfig;
pub use typed_dbm::TypedDbm;

pub mod errors;
pub mod remote;

pub mod testing {
    pub mod transport;
    pub mod types;
    pub mod util;
}
