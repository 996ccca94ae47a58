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

use std::path::PathBuf;

use crate::errors::TransportError;

/// Errors raised while opening a mapping instance.
#[derive(thiserror::Error, Debug)]
pub enum OpenError {
    #[error("invalid open flag {0:?}; expected one of r, w, c, n")]
    InvalidFlag(String),

    #[error("no store at {0:?} locally or remotely; open with flag c or n to create one")]
    StoreNotFound(PathBuf),

    #[error("remote object {0:?} is not a dbm-sync metadata document")]
    NotADbm(String),

    #[error("store was created with value codec {stored}, but {requested} was requested")]
    CodecMismatch { stored: String, requested: String },

    #[error("a writable flag requires a writable remote transport")]
    RemoteNotWritable,

    #[error("metadata io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata document is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("fetching remote metadata: {0}")]
    Transport(#[from] TransportError),
}
