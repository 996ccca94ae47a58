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

//! Freshness integration test
//!
//! A read compares the local record's digest with the remote index entry. The key
//! aspects being tested are:
//!
//! 1. **Hash Short-Circuit**: identical content is never downloaded again, even with a
//!    newer remote timestamp
//! 2. **Stale Local Copy**: a newer remote version is downloaded exactly once
//! 3. **Digest Agreement**: the hydrated local digest equals the index digest

use std::time::Duration;

use dbm_sync::testing::transport::MemoryTransport;
use dbm_sync::testing::util::open_store;
use dbm_sync::testing::util::TEST_BASE_KEY;
use dbm_sync::LocalDataConfig;
use dbm_sync::LocalRecord;
use dbm_sync::LocalStore;
use dbm_sync::OpenFlag;
use dbm_sync::RedbStore;
use dbm_sync::RemoteIndex;
use dbm_sync::StorePaths;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

#[tokio::test]
async fn test_same_content_is_not_downloaded() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    a.set("x", b"same".to_vec()).await?;
    a.sync().await?;

    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Write).await?;
    assert_eq!(b.get("x").await?, Some(b"same".to_vec()));
    b.close(false).await?;

    sleep(Duration::from_millis(5)).await;

    // Rewritten with identical content: newer timestamp, same hash.
    a.set("x", b"same".to_vec()).await?;
    a.sync().await?;

    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Write).await?;
    remote.reset_stats().await;

    assert_eq!(b.get("x").await?, Some(b"same".to_vec()));
    assert_eq!(remote.stats().await.gets, 0);

    a.close(false).await?;
    b.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_stale_copy_is_downloaded_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    a.set("x", b"v1".to_vec()).await?;
    a.sync().await?;

    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Write).await?;
    assert_eq!(b.get("x").await?, Some(b"v1".to_vec()));
    b.close(false).await?;

    sleep(Duration::from_millis(5)).await;

    a.set("x", b"v2".to_vec()).await?;
    a.sync().await?;

    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Write).await?;
    remote.reset_stats().await;

    assert_eq!(b.get("x").await?, Some(b"v2".to_vec()));
    assert_eq!(remote.stats().await.gets, 1);

    assert_eq!(b.get("x").await?, Some(b"v2".to_vec()));
    assert_eq!(remote.stats().await.gets, 1);

    b.close(false).await?;
    a.close(false).await?;

    // The record B stored carries exactly the digest the index publishes.
    let blob = remote
        .object(&format!("{}.remote_keys", TEST_BASE_KEY))
        .await
        .expect("index is published");
    let indexed = RemoteIndex::from_blob(&blob)?.get("x").expect("x is indexed");

    let paths = StorePaths::new(dir.path().join("b.meta"));
    let store = RedbStore::open(&paths.data, &LocalDataConfig::default())?;
    let bytes = store.get("x")?.expect("x is cached");
    let record = LocalRecord::decode(bytes)?;

    assert_eq!(record.digest, indexed);
    assert_eq!(record.payload, b"v2".to_vec());

    store.close()?;
    Ok(())
}

#[tokio::test]
async fn test_own_write_is_served_locally() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    a.set("x", b"v1".to_vec()).await?;
    a.sync().await?;

    sleep(Duration::from_millis(5)).await;

    // The index entry follows the local write, so reading it back is local.
    a.set("x", b"v2".to_vec()).await?;
    remote.reset_stats().await;

    assert_eq!(a.get("x").await?, Some(b"v2".to_vec()));
    assert_eq!(remote.stats().await.gets, 0);

    a.close(false).await?;
    Ok(())
}
