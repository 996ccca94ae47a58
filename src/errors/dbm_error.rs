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

use crate::errors::DigestError;
use crate::errors::LocalStoreError;
use crate::errors::OpenError;
use crate::errors::SerializationError;
use crate::errors::TransportError;

/// Errors surfaced by mapping operations.
#[derive(thiserror::Error, Debug)]
pub enum DbmError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("remote index lists key {0:?} but the remote object is missing")]
    Inconsistency(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("{0} rejected: the store is open read-only")]
    ReadOnly(String),

    #[error("{0} would delete every entry; pass confirm=true to proceed")]
    ConfirmationRequired(String),

    #[error("the store is closed")]
    Closed,

    #[error("key {0:?} is reserved for the store's own metadata")]
    ReservedKey(String),

    #[error("key of {0} bytes exceeds the remote index limit of 65535 bytes")]
    KeyTooLong(usize),

    #[error(transparent)]
    Local(#[from] LocalStoreError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("metadata io error: {0}")]
    Io(#[from] std::io::Error),

}

impl DbmError {
    /// Append a context to errors that carry a context chain.
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::Transport(e) => Self::Transport(e.context(context)),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
