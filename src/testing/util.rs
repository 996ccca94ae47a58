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

//! Testing utilities for opening stores and collecting bulk results.

use std::collections::BTreeMap;
use std::path::Path;

use futures::StreamExt;

use crate::errors::DbmError;
use crate::task_pool::KeyedStream;
use crate::testing::transport::MemoryTransport;
use crate::testing::types::TestConfig;
use crate::Dbm;
use crate::OpenFlag;
use crate::OpenOptions;

/// Base key used by [`open_store`].
pub const TEST_BASE_KEY: &str = "test-dbm";

/// Options used by [`open_store`]: a small worker pool and a fixed base key.
pub fn test_options(flag: OpenFlag, name: &str) -> OpenOptions {
    OpenOptions::new(flag)
        .worker_count(4)
        .base_key(TEST_BASE_KEY)
        .name(name)
}

/// Open a store named `name` under `dir`, e.g. one per simulated client.
///
/// Each store gets its own local files; pass clones of one [`MemoryTransport`] to make
/// them share the remote.
pub async fn open_store(
    dir: &Path,
    name: &str,
    remote: Option<MemoryTransport>,
    flag: OpenFlag,
) -> Result<Dbm<TestConfig>, DbmError> {
    let path = dir.join(format!("{}.meta", name));
    Dbm::open(path, remote, test_options(flag, name)).await
}

/// Drain a bulk result stream into a map keyed by key.
pub async fn collect_keyed<T>(strm: KeyedStream<String, T>) -> BTreeMap<String, T>
where T: Send + 'static {
    strm.collect::<Vec<_>>().await.into_iter().collect()
}
