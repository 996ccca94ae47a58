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

//! Typed mapping integration test
//!
//! A typed store encodes values with a codec recorded in the metadata. The key aspects
//! being tested are:
//!
//! 1. **Structured Values**: JSON and bincode values round trip through a shared remote
//! 2. **Codec Pinning**: re-opening with another codec fails
//! 3. **Decode Failures**: undecodable bytes are reported per key
//! 4. **KvMap**: generic code works over both the byte and the typed mapping

use std::fmt::Debug;

use dbm_sync::errors::DbmError;
use dbm_sync::errors::OpenError;
use dbm_sync::testing::transport::MemoryTransport;
use dbm_sync::testing::types::TestConfig;
use dbm_sync::testing::util::collect_keyed;
use dbm_sync::testing::util::open_store;
use dbm_sync::testing::util::test_options;
use dbm_sync::Codec;
use dbm_sync::KvMap;
use dbm_sync::OpenFlag;
use dbm_sync::TypedDbm;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    visits: u32,
}

fn profile(name: &str, visits: u32) -> Profile {
    Profile {
        name: name.to_string(),
        visits,
    }
}

#[tokio::test]
async fn test_typed_values_through_remote() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = MemoryTransport::new();

    let a = TypedDbm::<TestConfig, Profile>::open(
        dir.path().join("a.meta"),
        Some(remote.clone()),
        test_options(OpenFlag::Create, "a"),
        Codec::json(),
    )
    .await?;

    a.set("u1", &profile("ann", 3)).await?;
    a.set("u2", &profile("bob", 7)).await?;
    a.close(false).await?;

    let b = TypedDbm::<TestConfig, Profile>::open(
        dir.path().join("b.meta"),
        Some(remote.clone()),
        test_options(OpenFlag::Read, "b"),
        Codec::json(),
    )
    .await?;

    assert_eq!(b.get("u1").await?, Some(profile("ann", 3)));
    assert_eq!(b.get_strict("u2").await?, profile("bob", 7));
    assert_eq!(b.get_or("u3", profile("nobody", 0)).await?, profile("nobody", 0));

    let items = collect_keyed(b.items(None)?).await;
    assert_eq!(items.len(), 2);
    assert_eq!(items["u2"].as_ref().ok(), Some(&Some(profile("bob", 7))));

    b.close(false).await?;

    // The codec is part of the store.
    let res = TypedDbm::<TestConfig, Profile>::open(
        dir.path().join("c.meta"),
        Some(remote.clone()),
        test_options(OpenFlag::Read, "c"),
        Codec::bincode(),
    )
    .await;
    assert!(matches!(
        res,
        Err(DbmError::Open(OpenError::CodecMismatch { .. }))
    ));

    Ok(())
}

#[tokio::test]
async fn test_undecodable_value() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let db = TypedDbm::<TestConfig, Profile>::open(
        dir.path().join("t.meta"),
        None,
        test_options(OpenFlag::New, "t"),
        Codec::json(),
    )
    .await?;

    db.set("good", &profile("ann", 1)).await?;
    db.raw().set("bad", b"not json".to_vec()).await?;

    assert!(matches!(
        db.get("bad").await,
        Err(DbmError::Serialization(_))
    ));

    let items = collect_keyed(db.items(None)?).await;
    assert!(items["good"].is_ok());
    assert!(matches!(items["bad"], Err(DbmError::Serialization(_))));

    db.close(false).await?;
    Ok(())
}

async fn put_and_read<M>(map: &M, key: &str, value: M::Value) -> Result<(), DbmError>
where
    M: KvMap,
    M::Value: Clone + PartialEq + Debug,
{
    map.set(key, value.clone()).await?;
    assert_eq!(map.get_strict(key).await?, value);
    assert!(map.contains(key).await?);
    assert!(!map.is_empty()?);

    assert!(map.delete(key).await?);
    assert!(map.get(key).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_kv_map_over_both_mappings() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let raw = open_store(dir.path(), "raw", None, OpenFlag::New).await?;
    put_and_read(&raw, "k", b"bytes".to_vec()).await?;
    raw.close(false).await?;

    let typed = TypedDbm::<TestConfig, Profile>::open(
        dir.path().join("typed.meta"),
        None,
        test_options(OpenFlag::New, "typed"),
        Codec::json(),
    )
    .await?;
    put_and_read(&typed, "k", profile("cy", 2)).await?;
    typed.close(false).await?;

    Ok(())
}
