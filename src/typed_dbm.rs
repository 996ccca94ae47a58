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

use std::fmt;
use std::path::Path;

use futures::StreamExt;

use crate::codec::Codec;
use crate::errors::DbmError;
use crate::options::OpenOptions;
use crate::task_pool::KeyedStream;
use crate::Dbm;
use crate::TypeConfig;

/// A [`Dbm`] whose values are encoded with a [`Codec`].
///
/// The codec id is recorded in the store's metadata; opening a store with a different
/// codec fails.
pub struct TypedDbm<C, V>
where C: TypeConfig
{
    inner: Dbm<C>,
    codec: Codec<V>,
}

impl<C, V> fmt::Display for TypedDbm<C, V>
where C: TypeConfig
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}<{}>", self.inner, self.codec.id())
    }
}

impl<C, V> TypedDbm<C, V>
where
    C: TypeConfig,
    V: Send + 'static,
{
    /// Open with `options.codec` overridden by the codec's id.
    pub async fn open(
        path: impl AsRef<Path>,
        remote: Option<C::Remote>,
        options: OpenOptions,
        codec: Codec<V>,
    ) -> Result<Self, DbmError> {
        let options = options.codec(codec.id().clone());
        let inner = Dbm::open(path, remote, options).await?;
        Ok(TypedDbm { inner, codec })
    }

    /// The underlying byte-valued mapping.
    pub fn raw(&self) -> &Dbm<C> {
        &self.inner
    }

    pub fn into_inner(self) -> Dbm<C> {
        self.inner
    }

    pub fn codec(&self) -> &Codec<V> {
        &self.codec
    }

    pub async fn get(&self, key: &str) -> Result<Option<V>, DbmError> {
        let Some(bytes) = self.inner.get(key).await? else {
            return Ok(None);
        };
        Ok(Some(self.codec.decode(&bytes)?))
    }

    pub async fn get_strict(&self, key: &str) -> Result<V, DbmError> {
        let bytes = self.inner.get_strict(key).await?;
        Ok(self.codec.decode(&bytes)?)
    }

    pub async fn get_or(&self, key: &str, default: V) -> Result<V, DbmError> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    pub async fn set(&self, key: &str, value: &V) -> Result<(), DbmError> {
        let bytes = self.codec.encode(value)?;
        self.inner.set(key, bytes).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, DbmError> {
        self.inner.delete(key).await
    }

    pub async fn contains(&self, key: &str) -> Result<bool, DbmError> {
        self.inner.contains(key).await
    }

    pub fn keys(&self) -> Result<Vec<String>, DbmError> {
        self.inner.keys()
    }

    pub fn len(&self) -> Result<usize, DbmError> {
        self.inner.len()
    }

    pub fn is_empty(&self) -> Result<bool, DbmError> {
        self.inner.is_empty()
    }

    /// Decoded [`Dbm::items`]; a value that fails to decode is an error for its key only.
    pub fn items(
        &self,
        keys: Option<Vec<String>>,
    ) -> Result<KeyedStream<String, Result<Option<V>, DbmError>>, DbmError> {
        let codec = self.codec.clone();
        let strm = self.inner.items(keys)?.map(move |(key, res)| {
            let decoded = match res {
                Ok(Some(bytes)) => codec.decode(&bytes).map(Some).map_err(DbmError::from),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };
            (key, decoded)
        });
        Ok(strm.boxed())
    }

    /// Encode every value first; nothing is written if any value fails to encode.
    pub fn update<I>(&self, pairs: I) -> Result<KeyedStream<String, Result<(), DbmError>>, DbmError>
    where I: IntoIterator<Item = (String, V)> {
        let mut encoded = Vec::new();
        for (key, value) in pairs {
            let bytes = self.codec.encode(&value)?;
            encoded.push((key, bytes));
        }
        self.inner.update(encoded)
    }

    pub async fn clear(&self, confirm: bool) -> Result<(), DbmError> {
        self.inner.clear(confirm).await
    }

    pub async fn sync(&self) -> Result<(), DbmError> {
        self.inner.sync().await
    }

    pub async fn close(&self, force: bool) -> Result<(), DbmError> {
        self.inner.close(force).await
    }
}
