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

/// A value codec failed to encode or decode a payload.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub struct SerializationError {
    /// The codec that failed, e.g. `json` or `bincode`.
    codec: String,

    reason: String,
}

impl SerializationError {
    pub fn new(codec: impl ToString, reason: impl fmt::Display) -> Self {
        SerializationError {
            codec: codec.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} codec failed: {}", self.codec, self.reason)
    }
}
