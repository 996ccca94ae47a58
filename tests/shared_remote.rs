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

//! Shared remote integration test
//!
//! Several clients, each with its own local files, share one remote store. The key
//! aspects being tested are:
//!
//! 1. **Hydration**: a key written by one client is downloaded by another on first read
//! 2. **Local Hits**: a fresh local copy is served without touching the remote
//! 3. **Index Authority**: a key deleted elsewhere is absent even if a local copy remains
//! 4. **Metadata Reconcile**: re-opening downloads the index only if the remote changed
//! 5. **Publishing**: the index and metadata are uploaded on sync

use std::time::Duration;

use dbm_sync::testing::transport::MemoryTransport;
use dbm_sync::testing::util::open_store;
use dbm_sync::testing::util::TEST_BASE_KEY;
use dbm_sync::OpenFlag;
use dbm_sync::RemoteIndex;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

#[tokio::test]
async fn test_hydrate_from_other_client() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    a.set("x", b"1".to_vec()).await?;
    a.sync().await?;

    // Published: the object, the index and the metadata.
    let objects = remote.object_keys().await;
    assert!(objects.contains(&"x".to_string()));
    assert!(objects.contains(&TEST_BASE_KEY.to_string()));
    assert!(objects.contains(&format!("{}.remote_keys", TEST_BASE_KEY)));

    // Not yet published: invisible to other clients until A syncs again.
    a.set("y", b"2".to_vec()).await?;

    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Create).await?;
    assert_eq!(b.keys()?, vec!["x".to_string()]);
    assert!(b.contains("x").await?);
    assert!(!b.contains("y").await?);
    assert_eq!(b.get("y").await?, None);

    remote.reset_stats().await;

    assert_eq!(b.get("x").await?, Some(b"1".to_vec()));
    assert_eq!(remote.stats().await.gets, 1);

    // Now fresh locally.
    assert_eq!(b.get("x").await?, Some(b"1".to_vec()));
    assert_eq!(remote.stats().await.gets, 1);

    a.close(false).await?;
    b.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_deleted_elsewhere_is_absent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    a.set("x", b"1".to_vec()).await?;
    a.sync().await?;

    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Write).await?;
    assert_eq!(b.get("x").await?, Some(b"1".to_vec()));
    b.close(false).await?;

    sleep(Duration::from_millis(5)).await;

    assert!(a.delete("x").await?);
    a.sync().await?;
    assert_eq!(remote.object("x").await, None);

    // B still has a local record of "x", but the re-downloaded index does not list it.
    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Write).await?;
    assert_eq!(b.get("x").await?, None);
    assert!(!b.contains("x").await?);
    assert_eq!(b.len()?, 0);

    a.close(false).await?;
    b.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_reopen_reuses_local_index_when_unchanged() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    a.set("k", b"v".to_vec()).await?;
    a.close(false).await?;

    remote.reset_stats().await;

    // Only the metadata document is fetched: the local index copy is current.
    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Write).await?;
    assert_eq!(remote.stats().await.gets, 1);
    assert_eq!(a.keys()?, vec!["k".to_string()]);

    // Served from the local store.
    assert_eq!(a.get("k").await?, Some(b"v".to_vec()));
    assert_eq!(remote.stats().await.gets, 1);

    a.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_sync_publishes_only_changes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    a.update(vec![
        ("k1".to_string(), b"v1".to_vec()),
        ("k2".to_string(), b"v2".to_vec()),
    ])?
    .for_each(|_| async {})
    .await;
    a.sync().await?;

    let blob = remote
        .object(&format!("{}.remote_keys", TEST_BASE_KEY))
        .await
        .expect("index is published");
    let index = RemoteIndex::from_blob(&blob)?;
    assert_eq!(index.keys(), vec!["k1".to_string(), "k2".to_string()]);

    let published = a.metadata().last_modified;

    // Nothing changed: no upload.
    remote.reset_stats().await;
    a.sync().await?;
    assert_eq!(remote.stats().await.puts, 0);
    assert_eq!(a.metadata().last_modified, published);

    // A change republishes index and metadata with a later timestamp.
    a.set("k3", b"v3".to_vec()).await?;
    remote.reset_stats().await;
    a.sync().await?;
    assert_eq!(remote.stats().await.puts, 2);
    assert!(a.metadata().last_modified > published);

    a.close(false).await?;
    Ok(())
}
