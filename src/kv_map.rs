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

//! A mapping abstraction shared by the byte-valued and the typed store.

use crate::errors::DbmError;
use crate::Dbm;
use crate::TypeConfig;
use crate::TypedDbm;

/// Asynchronous dictionary-style access to a store.
///
/// Code written against `KvMap` works with both [`Dbm`] and [`TypedDbm`].
#[async_trait::async_trait]
pub trait KvMap
where Self: Send + Sync
{
    type Value: Send + 'static;

    async fn get(&self, key: &str) -> Result<Option<Self::Value>, DbmError>;

    /// Like [`KvMap::get`] but a missing key is [`DbmError::NotFound`].
    async fn get_strict(&self, key: &str) -> Result<Self::Value, DbmError> {
        match self.get(key).await? {
            Some(v) => Ok(v),
            None => Err(DbmError::NotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: Self::Value) -> Result<(), DbmError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, DbmError>;

    async fn contains(&self, key: &str) -> Result<bool, DbmError>;

    fn keys(&self) -> Result<Vec<String>, DbmError>;

    fn len(&self) -> Result<usize, DbmError>;

    fn is_empty(&self) -> Result<bool, DbmError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait::async_trait]
impl<C> KvMap for Dbm<C>
where C: TypeConfig
{
    type Value = Vec<u8>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DbmError> {
        Dbm::get(self, key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), DbmError> {
        Dbm::set(self, key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, DbmError> {
        Dbm::delete(self, key).await
    }

    async fn contains(&self, key: &str) -> Result<bool, DbmError> {
        Dbm::contains(self, key).await
    }

    fn keys(&self) -> Result<Vec<String>, DbmError> {
        Dbm::keys(self)
    }

    fn len(&self) -> Result<usize, DbmError> {
        Dbm::len(self)
    }
}

#[async_trait::async_trait]
impl<C, V> KvMap for TypedDbm<C, V>
where
    C: TypeConfig,
    V: Send + Sync + 'static,
{
    type Value = V;

    async fn get(&self, key: &str) -> Result<Option<V>, DbmError> {
        TypedDbm::get(self, key).await
    }

    async fn set(&self, key: &str, value: V) -> Result<(), DbmError> {
        TypedDbm::set(self, key, &value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, DbmError> {
        TypedDbm::delete(self, key).await
    }

    async fn contains(&self, key: &str) -> Result<bool, DbmError> {
        TypedDbm::contains(self, key).await
    }

    fn keys(&self) -> Result<Vec<String>, DbmError> {
        TypedDbm::keys(self)
    }

    fn len(&self) -> Result<usize, DbmError> {
        TypedDbm::len(self)
    }
}
