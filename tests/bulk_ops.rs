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

//! Bulk operations integration test
//!
//! Bulk calls fan out over the worker pool and report one result per key. The key
//! aspects being tested are:
//!
//! 1. **Batched Deletes**: remote deletes are sent in batches of at most 1000 objects
//! 2. **Deferred Deletes**: a single delete reaches the remote on sync
//! 3. **Per-Key Results**: `update` and `items` yield a result for every key
//! 4. **Failure Isolation**: one failing key does not affect the others
//! 5. **Forced Close**: a forced close still persists completed writes

use std::collections::BTreeMap;

use dbm_sync::errors::DbmError;
use dbm_sync::testing::transport::MemoryTransport;
use dbm_sync::testing::util::collect_keyed;
use dbm_sync::testing::util::open_store;
use dbm_sync::OpenFlag;
use futures::StreamExt;
use pretty_assertions::assert_eq;

fn pairs(n: usize) -> Vec<(String, Vec<u8>)> {
    (0..n)
        .map(|i| (format!("k{:05}", i), format!("v{}", i).into_bytes()))
        .collect()
}

#[tokio::test]
async fn test_bulk_delete_is_batched() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let db = open_store(dir.path(), "bulk", Some(remote.clone()), OpenFlag::Create).await?;

    let results = collect_keyed(db.update(pairs(2500))?).await;
    assert_eq!(results.len(), 2500);
    assert!(results.values().all(|r| r.is_ok()));
    assert_eq!(db.len()?, 2500);

    remote.reset_stats().await;

    let keys: Vec<String> = pairs(2500).into_iter().map(|(k, _)| k).collect();
    let existed = db.delete_many(&keys).await?;
    assert_eq!(existed, 2500);

    let stats = remote.stats().await;
    assert_eq!(stats.delete_batches, 3);
    assert_eq!(stats.deleted, 2500);
    assert_eq!(db.len()?, 0);

    db.close(false).await?;

    // Only the metadata document and the index are left.
    assert_eq!(remote.object_keys().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_single_delete_is_deferred() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let db = open_store(dir.path(), "deferred", Some(remote.clone()), OpenFlag::Create).await?;
    db.set("a", b"1".to_vec()).await?;
    db.set("b", b"2".to_vec()).await?;

    remote.reset_stats().await;
    assert!(db.delete("a").await?);

    assert_eq!(remote.stats().await.delete_batches, 0);
    assert!(remote.object("a").await.is_some());
    assert_eq!(db.get("a").await?, None);

    db.sync().await?;
    assert_eq!(remote.stats().await.delete_batches, 1);
    assert_eq!(remote.object("a").await, None);

    // Re-setting a key with a queued delete keeps the new object.
    assert!(db.delete("b").await?);
    db.set("b", b"3".to_vec()).await?;
    db.sync().await?;
    assert_eq!(remote.object("b").await, Some(b"3".to_vec()));

    db.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_items_per_key_results() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = open_store(dir.path(), "a", Some(remote.clone()), OpenFlag::Create).await?;
    let results = collect_keyed(a.update(pairs(10))?).await;
    assert!(results.values().all(|r| r.is_ok()));
    a.sync().await?;

    let b = open_store(dir.path(), "b", Some(remote.clone()), OpenFlag::Write).await?;
    remote.force_status("k00003", 500).await;

    let items = collect_keyed(b.items(None)?).await;
    assert_eq!(items.len(), 10);

    for (key, res) in items {
        if key == "k00003" {
            match res {
                Err(DbmError::Transport(e)) => assert_eq!(e.status_code(), Some(500)),
                other => panic!("expected a transport error, got {:?}", other),
            }
        } else {
            let want = format!("v{}", key[1..].parse::<usize>()?).into_bytes();
            assert_eq!(res?, Some(want));
        }
    }

    // Requested keys that do not exist are absent, not errors.
    let items = collect_keyed(b.items(Some(vec!["k00001".to_string(), "nope".to_string()]))?).await;
    let items: BTreeMap<String, Option<Vec<u8>>> = items
        .into_iter()
        .map(|(k, v)| v.map(|v| (k, v)))
        .collect::<Result<_, _>>()?;
    assert_eq!(items.get("k00001"), Some(&Some(b"v1".to_vec())));
    assert_eq!(items.get("nope"), Some(&None));

    let values: Vec<_> = b.values(Some(vec!["k00002".to_string()]))?.collect().await;
    assert_eq!(values.len(), 1);

    a.close(false).await?;
    b.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_update_last_value_wins() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = open_store(dir.path(), "dup", None, OpenFlag::New).await?;

    let results = collect_keyed(db.update(vec![
        ("k".to_string(), b"first".to_vec()),
        ("k".to_string(), b"second".to_vec()),
    ])?)
    .await;

    assert_eq!(results.len(), 1);
    assert_eq!(db.get("k").await?, Some(b"second".to_vec()));

    db.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_update_rejected_when_read_only() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let db = open_store(dir.path(), "ro", None, OpenFlag::Create).await?;
    db.close(false).await?;

    let db = open_store(dir.path(), "ro", None, OpenFlag::Read).await?;
    let res = db.update(pairs(1));
    assert!(matches!(res, Err(DbmError::ReadOnly(_))));

    db.close(false).await?;
    Ok(())
}

#[tokio::test]
async fn test_forced_close_persists_completed_writes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let db = open_store(dir.path(), "forced", Some(remote.clone()), OpenFlag::Create).await?;
    let mut strm = db.update(pairs(50))?;

    // Wait for one write, then force close while the rest may still be queued.
    let (first, res) = strm.next().await.expect("at least one write completes");
    res?;

    db.close(true).await?;

    let db = open_store(dir.path(), "forced", Some(remote.clone()), OpenFlag::Write).await?;
    assert!(db.contains(&first).await?);
    assert!(db.len()? >= 1);

    db.close(false).await?;
    Ok(())
}
