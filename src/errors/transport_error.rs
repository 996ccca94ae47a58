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
use std::io;

use crate::errors::either::Either;

/// A remote object-store call failed.
///
/// Raised for any status other than `200` and `404`, and for network-level failures
/// where no status was received at all. Retrying is the transport's business; this
/// error is propagated to the caller as-is, with the chain of contexts describing
/// what the mapping was doing when it happened.
///
/// ```rust
/// # use dbm_sync::errors::TransportError;
/// let err = TransportError::status(503, "Slow Down")
///     .context("get: foo")
///     .context("hydrate");
/// assert_eq!(err.status_code(), Some(503));
/// ```
#[derive(thiserror::Error, Debug)]
pub struct TransportError {
    /// The status returned by the remote, if a response was received.
    status: Option<u16>,

    reason: Either<io::Error, String>,

    /// Contexts appended by each layer the error passed through.
    when: Vec<String>,
}

impl TransportError {
    pub fn new(reason: impl Into<Either<io::Error, String>>) -> Self {
        TransportError {
            status: None,
            reason: reason.into(),
            when: vec![],
        }
    }

    /// The remote answered with a status this layer does not accept.
    pub fn status(status: u16, reason: impl ToString) -> Self {
        TransportError {
            status: Some(status),
            reason: Either::B(reason.to_string()),
            when: vec![],
        }
    }

    pub fn new_io_error(reason: impl Into<io::Error>) -> Self {
        TransportError {
            status: None,
            reason: Either::A(reason.into()),
            when: vec![],
        }
    }

    pub fn new_str(reason: impl ToString) -> Self {
        TransportError {
            status: None,
            reason: Either::B(reason.to_string()),
            when: vec![],
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status
    }

    /// Append a context describing when the error occurred.
    pub fn context(mut self, context: impl ToString) -> Self {
        self.when.push(context.to_string());
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "remote transport error")?;

        if let Some(status) = self.status {
            write!(f, " (status {})", status)?;
        }

        write!(f, ": {}", self.reason)?;

        if self.when.is_empty() {
            return Ok(());
        }

        write!(f, "; when: (")?;

        for (i, when) in self.when.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", when)?;
        }

        write!(f, ")")
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::new_io_error(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_status_error() {
        let err = TransportError::status(500, "Internal Server Error");
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(
            err.to_string(),
            "remote transport error (status 500): Internal Server Error"
        );
    }

    #[test]
    fn test_io_error_has_no_status() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err: TransportError = io_err.into();
        assert_eq!(err.status_code(), None);
        assert_eq!(err.to_string(), "remote transport error: connection reset");
    }

    #[test]
    fn test_context_chain() {
        let err = TransportError::status(403, "Forbidden")
            .context("put: a")
            .context("update");
        assert_eq!(
            err.to_string(),
            "remote transport error (status 403): Forbidden; when: (put: a; update)"
        );
    }
}
