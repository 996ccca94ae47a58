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

//! Error types of the mapping and its collaborators.

mod dbm_error;
mod digest_error;
mod either;
mod local_store_error;
mod open_error;
mod serialization_error;
mod transport_error;

pub use dbm_error::DbmError;
pub use digest_error::DigestError;
pub use either::Either;
pub use local_store_error::LocalStoreError;
pub use open_error::OpenError;
pub use serialization_error::SerializationError;
pub use transport_error::TransportError;
