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

/// A value that is one of two types.
///
/// Used as the cause of a [`TransportError`](crate::errors::TransportError): either an
/// `io::Error` raised by the network layer, or a textual description produced by the
/// transport itself, such as an unexpected HTTP status line.
///
/// # Examples
///
/// ```rust
/// use std::io;
///
/// use dbm_sync::errors::Either;
///
/// let cause: Either<io::Error, String> = Either::A(io::Error::other("socket reset"));
/// let cause: Either<io::Error, String> = Either::B("503 Slow Down".to_string());
/// ```
#[derive(Debug)]
pub enum Either<A, B> {
    A(A),
    B(B),
}

impl<A, B> Either<A, B> {
    pub fn is_io(&self) -> bool {
        matches!(self, Either::A(_))
    }
}

impl fmt::Display for Either<io::Error, String> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Either::A(e) => write!(f, "{}", e),
            Either::B(s) => write!(f, "{}", s),
        }
    }
}

impl From<io::Error> for Either<io::Error, String> {
    fn from(e: io::Error) -> Self {
        Either::A(e)
    }
}

impl From<String> for Either<io::Error, String> {
    fn from(s: String) -> Self {
        Either::B(s)
    }
}

impl From<&str> for Either<io::Error, String> {
    fn from(s: &str) -> Self {
        Either::B(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_io_cause() {
        let cause: Either<io::Error, String> =
            io::Error::new(io::ErrorKind::TimedOut, "read timed out").into();

        assert!(cause.is_io());
        assert_eq!(cause.to_string(), "read timed out");
    }

    #[test]
    fn test_text_cause() {
        let owned: Either<io::Error, String> = "500 Internal Server Error".to_string().into();
        let borrowed: Either<io::Error, String> = "403 Forbidden".into();

        assert!(!owned.is_io());
        assert_eq!(owned.to_string(), "500 Internal Server Error");

        match borrowed {
            Either::A(_) => panic!("Expected Either::B"),
            Either::B(s) => assert_eq!(s, "403 Forbidden"),
        }
    }
}
