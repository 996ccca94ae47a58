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

//! The per-store metadata document.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use serde::Deserialize;
use serde::Serialize;

use crate::codec::CodecId;
use crate::digest::now_millis;
use crate::errors::OpenError;
use crate::errors::TransportError;
use crate::local_store::LocalDataConfig;
use crate::remote;
use crate::remote::RemoteTransport;

/// Value of the `file_type` field and of the matching object user metadata.
pub const FILE_TYPE: &str = "dbm-sync";

pub const SCHEMA_VERSION: u32 = 1;

/// Describes how a store was created and when its remote index last changed.
///
/// One copy sits next to the local data file, another at the store's base key on the
/// remote. A remote copy with a later `last_modified` means the remote index changed
/// since this client last downloaded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub file_type: String,
    pub schema_version: u32,
    pub local_data: LocalDataConfig,
    pub value_codec: CodecId,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
}

impl Metadata {
    pub fn new(local_data: LocalDataConfig, value_codec: CodecId) -> Self {
        Metadata {
            file_type: FILE_TYPE.to_string(),
            schema_version: SCHEMA_VERSION,
            local_data,
            value_codec,
            last_modified: now_millis(),
        }
    }

    /// Record a change of the remote index.
    pub fn touch(&mut self) {
        // Strictly increasing even when the clock did not move.
        self.last_modified = std::cmp::max(now_millis(), self.last_modified + 1);
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a metadata document; `origin` names its location for error messages.
    pub fn from_json(bytes: &[u8], origin: &str) -> Result<Self, OpenError> {
        let meta: Metadata = serde_json::from_slice(bytes)?;
        if meta.file_type != FILE_TYPE {
            return Err(OpenError::NotADbm(origin.to_string()));
        }
        Ok(meta)
    }

    pub fn load_local(path: &Path) -> Result<Option<Self>, OpenError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(Self::from_json(&bytes, &path.display().to_string())?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_local(&self, path: &Path) -> std::io::Result<()> {
        let bytes = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, bytes)
    }

    /// Fetch the remote copy stored at `key`, if any.
    pub async fn fetch_remote<T>(transport: &T, key: &str) -> Result<Option<Self>, OpenError>
    where T: RemoteTransport + ?Sized {
        let Some((body, meta)) = remote::get_optional(transport, key).await? else {
            return Ok(None);
        };

        if let Some(ft) = meta.user.get(remote::FILE_TYPE) {
            if ft != FILE_TYPE {
                return Err(OpenError::NotADbm(key.to_string()));
            }
        }

        Ok(Some(Self::from_json(&body, key)?))
    }

    pub async fn upload<T>(&self, transport: &T, key: &str) -> Result<(), TransportError>
    where T: RemoteTransport + ?Sized {
        let body = self
            .to_json()
            .map_err(|e| TransportError::new_str(e).context("encoding metadata"))?;

        let mut user = BTreeMap::new();
        user.insert(remote::FILE_TYPE.to_string(), FILE_TYPE.to_string());

        transport.put(key, body, user).await
    }
}

/// Outcome of comparing the local and remote metadata documents on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The document to adopt, `None` if neither side has one.
    pub metadata: Option<Metadata>,

    /// Whether the remote index must be downloaded again.
    pub download_index: bool,
}

/// The remote copy wins when the local one is absent or older.
pub fn reconcile(local: Option<Metadata>, remote: Option<Metadata>) -> Reconciled {
    match (local, remote) {
        (local, None) => Reconciled {
            metadata: local,
            download_index: false,
        },
        (None, Some(remote)) => {
            info!("metadata: no local copy, adopting remote");
            Reconciled {
                metadata: Some(remote),
                download_index: true,
            }
        }
        (Some(local), Some(remote)) => {
            if remote.last_modified > local.last_modified {
                info!(
                    "metadata: remote is newer ({} > {}), index will be re-downloaded",
                    remote.last_modified, local.last_modified
                );
                Reconciled {
                    metadata: Some(remote),
                    download_index: true,
                }
            } else {
                Reconciled {
                    metadata: Some(local),
                    download_index: false,
                }
            }
        }
    }
}
