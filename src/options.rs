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

//! Open-time configuration.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use crate::codec::CodecId;
use crate::errors::OpenError;
use crate::local_store::LocalDataConfig;

/// How to open a store, with classic dbm semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenFlag {
    /// `r`: open an existing store read-only.
    #[default]
    Read,
    /// `w`: open an existing store for reading and writing.
    Write,
    /// `c`: open for reading and writing, creating the store if absent.
    Create,
    /// `n`: always start from a new, empty local store.
    New,
}

impl OpenFlag {
    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenFlag::Read)
    }

    /// Whether a missing store may be created.
    pub fn creates(&self) -> bool {
        matches!(self, OpenFlag::Create | OpenFlag::New)
    }
}

impl FromStr for OpenFlag {
    type Err = OpenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(OpenFlag::Read),
            "w" => Ok(OpenFlag::Write),
            "c" => Ok(OpenFlag::Create),
            "n" => Ok(OpenFlag::New),
            other => Err(OpenError::InvalidFlag(other.to_string())),
        }
    }
}

impl fmt::Display for OpenFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let c = match self {
            OpenFlag::Read => "r",
            OpenFlag::Write => "w",
            OpenFlag::Create => "c",
            OpenFlag::New => "n",
        };
        write!(f, "{}", c)
    }
}

/// Options of [`Dbm::open`](crate::Dbm::open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub flag: OpenFlag,

    /// Maximum number of concurrent remote operations in bulk calls.
    pub worker_count: usize,

    /// Remote key of the metadata document. The remote index lives at
    /// `<base_key>.remote_keys`.
    pub base_key: String,

    /// Used only when the local store is created.
    pub local_data: LocalDataConfig,

    pub codec: CodecId,

    /// Name used in log messages.
    pub name: String,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            flag: OpenFlag::default(),
            worker_count: 30,
            base_key: "dbm-sync".to_string(),
            local_data: LocalDataConfig::default(),
            codec: CodecId::Raw,
            name: "dbm".to_string(),
        }
    }
}

impl OpenOptions {
    pub fn new(flag: OpenFlag) -> Self {
        OpenOptions {
            flag,
            ..Default::default()
        }
    }

    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    pub fn base_key(mut self, key: impl ToString) -> Self {
        self.base_key = key.to_string();
        self
    }

    pub fn local_data(mut self, config: LocalDataConfig) -> Self {
        self.local_data = config;
        self
    }

    pub fn codec(mut self, codec: CodecId) -> Self {
        self.codec = codec;
        self
    }

    pub fn name(mut self, name: impl ToString) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn index_key(&self) -> String {
        index_key(&self.base_key)
    }
}

pub(crate) fn index_key(base_key: &str) -> String {
    format!("{}.remote_keys", base_key)
}

/// Local files of a store, derived from the metadata path `P`:
/// `P` (metadata), `P.data` (local store), `P.remote_keys` (local copy of the index).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub meta: PathBuf,
    pub data: PathBuf,
    pub index: PathBuf,
}

impl StorePaths {
    pub fn new(meta: impl AsRef<Path>) -> Self {
        let meta = meta.as_ref().to_path_buf();
        StorePaths {
            data: with_suffix(&meta, ".data"),
            index: with_suffix(&meta, ".remote_keys"),
            meta,
        }
    }

    pub(crate) fn create_parent(&self) -> std::io::Result<()> {
        match self.meta.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }

    /// Delete all local files of the store; missing files are ignored.
    pub(crate) fn remove_all(&self) -> std::io::Result<()> {
        for p in [&self.meta, &self.data, &self.index] {
            match std::fs::remove_file(p) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
