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
use std::future::Future;

use crate::local_store::LocalStore;
use crate::remote::RemoteTransport;

/// Binds the collaborators a mapping instance is built from.
pub trait TypeConfig
where
    Self: fmt::Debug,
    Self: Default,
    Self: Send + Sync + 'static,
{
    /// The embedded store holding cached records.
    type Local: LocalStore;

    /// The object store holding the authoritative records.
    type Remote: RemoteTransport;

    /// Spawn a future that will run in the background.
    ///
    /// Used by the task pool to start one worker per bulk key operation. `name` is used
    /// for debugging purposes, it can be any string that identifies the future.
    fn spawn<F>(future: F, name: impl ToString)
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static;
}
