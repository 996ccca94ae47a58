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

//! The remote object-store contract.

use std::collections::BTreeMap;

use futures::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use futures::TryStreamExt;
use log::debug;

use crate::errors::TransportError;

/// Object found.
pub const STATUS_OK: u16 = 200;

/// Object absent.
pub const STATUS_NOT_FOUND: u16 = 404;

/// Largest number of objects a single bulk-delete call may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

/// User metadata entry carrying the digest timestamp an object was written with.
pub const UPLOAD_TIMESTAMP: &str = "upload_timestamp";

/// User metadata entry tagging the metadata document.
pub const FILE_TYPE: &str = "file_type";

/// A lazily-read object body.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Metadata returned along with an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Milliseconds since the Unix epoch, as reported by the store.
    pub last_modified: i64,
    pub content_type: Option<String>,
    /// User metadata stored with the object.
    pub user: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// The digest timestamp recorded at upload, falling back to the store's
    /// last-modified time.
    pub fn upload_timestamp(&self) -> i64 {
        self.user
            .get(UPLOAD_TIMESTAMP)
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.last_modified)
    }
}

/// Response of [`RemoteTransport::get`].
pub struct GetResponse {
    pub status: u16,
    pub body: ByteStream,
    pub meta: ObjectMeta,
}

impl GetResponse {
    pub fn found(body: Vec<u8>, meta: ObjectMeta) -> Self {
        GetResponse {
            status: STATUS_OK,
            body: stream::once(async move { Ok(body) }).boxed(),
            meta,
        }
    }

    pub fn with_status(status: u16) -> Self {
        GetResponse {
            status,
            body: stream::empty().boxed(),
            meta: ObjectMeta::default(),
        }
    }

    /// Drain the body into memory.
    pub async fn read_all(self) -> Result<Vec<u8>, TransportError> {
        self.body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }
}

/// One entry of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: i64,
}

/// One page of a remote listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,

    /// Token to fetch the next page; `None` on the last page.
    pub next: Option<String>,
}

/// Parameters of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub prefix: Option<String>,
    pub start_after: Option<String>,
    pub delimiter: Option<String>,
}

impl ListParams {
    pub fn prefix(prefix: impl ToString) -> Self {
        ListParams {
            prefix: Some(prefix.to_string()),
            ..Default::default()
        }
    }
}

/// Identifies one object, optionally one version of it, for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectId {
    pub key: String,
    pub version: Option<String>,
}

impl ObjectId {
    pub fn new(key: impl ToString) -> Self {
        ObjectId {
            key: key.to_string(),
            version: None,
        }
    }
}

/// Access to a remote object store or a plain HTTP origin.
///
/// Implementations own connection handling, credentials and retry policy; every error they
/// return is final from the mapping's point of view.
#[async_trait::async_trait]
pub trait RemoteTransport
where
    Self: Send + Sync + 'static,
{
    /// Fetch an object. `200` and `404` are answered through [`GetResponse::status`];
    /// other outcomes may be returned either way and are treated as errors.
    async fn get(&self, key: &str) -> Result<GetResponse, TransportError>;

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        user_meta: BTreeMap<String, String>,
    ) -> Result<(), TransportError>;

    /// Fetch one page of a listing.
    async fn list_page(
        &self,
        params: &ListParams,
        continuation: Option<String>,
    ) -> Result<ListPage, TransportError>;

    /// Delete up to [`MAX_DELETE_BATCH`] objects in one call.
    async fn delete_batch(&self, ids: Vec<ObjectId>) -> Result<(), TransportError>;

    /// Whether this transport accepts writes. A public HTTP origin does not.
    fn writable(&self) -> bool {
        true
    }
}

/// List every object matching `params`, following continuation tokens transparently.
pub fn list<T>(
    transport: &T,
    params: ListParams,
) -> BoxStream<'_, Result<ObjectInfo, TransportError>>
where
    T: RemoteTransport + ?Sized,
{
    // State: the continuation of the next page to fetch; `None` once the last page is read.
    let pages = stream::try_unfold(Some(None::<String>), move |state| {
        let params = params.clone();
        async move {
            let Some(continuation) = state else {
                return Ok::<_, TransportError>(None);
            };

            let page = transport.list_page(&params, continuation).await?;
            debug!(
                "list {:?}: page of {} objects, more={}",
                params.prefix,
                page.objects.len(),
                page.next.is_some()
            );

            let objects = page.objects.into_iter().map(Ok::<ObjectInfo, TransportError>);
            Ok(Some((stream::iter(objects), page.next.map(Some))))
        }
    });

    pages.try_flatten().boxed()
}

/// Delete `ids`, split into calls of at most [`MAX_DELETE_BATCH`] objects.
///
/// Returns the number of calls made.
pub async fn delete_in_chunks<T>(
    transport: &T,
    ids: Vec<ObjectId>,
) -> Result<usize, TransportError>
where
    T: RemoteTransport + ?Sized,
{
    let mut calls = 0;

    for chunk in ids.chunks(MAX_DELETE_BATCH) {
        transport
            .delete_batch(chunk.to_vec())
            .await
            .map_err(|e| e.context(format!("delete_batch of {} objects", chunk.len())))?;
        calls += 1;
    }

    Ok(calls)
}

/// Fetch an object expecting `200` or `404`; `404` maps to `None`.
pub async fn get_optional<T>(
    transport: &T,
    key: &str,
) -> Result<Option<(Vec<u8>, ObjectMeta)>, TransportError>
where
    T: RemoteTransport + ?Sized,
{
    let resp = transport.get(key).await?;

    match resp.status {
        STATUS_OK => {
            let meta = resp.meta.clone();
            let body = resp.read_all().await?;
            Ok(Some((body, meta)))
        }
        STATUS_NOT_FOUND => Ok(None),
        status => Err(
            TransportError::status(status, "unexpected status").context(format!("get: {}", key)),
        ),
    }
}
