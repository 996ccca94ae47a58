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

/// Errors raised by the embedded local store.
#[derive(thiserror::Error, Debug)]
pub enum LocalStoreError {
    #[error("local store database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("local store transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),

    #[error("local store table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("local store storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("local store commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("local store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local store is closed")]
    Closed,
}

impl From<redb::TransactionError> for LocalStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}
