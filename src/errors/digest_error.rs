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

/// A digest or a local record could not be built or parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("local record of {actual} bytes is shorter than the {expected}-byte digest prefix")]
    TruncatedRecord { expected: usize, actual: usize },

    #[error("timestamp {0} does not fit in 48 signed bits")]
    TimestampOutOfRange(i64),

    #[error("payload of {0} bytes exceeds the 32-bit size field")]
    PayloadTooLarge(usize),

    #[error("remote index blob is malformed: {0}")]
    MalformedIndex(String),
}
