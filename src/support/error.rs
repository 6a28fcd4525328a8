//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Everything that can go wrong while reading a request.
///
/// This is `Clone` because the parser keeps the first error it encounters in
/// a sticky slot and hands copies of it out to callers; the I/O case is thus
/// wrapped in an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The current line ended before the token being read did.
    ///
    /// This is usually transient: `accept()` treats it as a plain mismatch.
    #[error("line too short")]
    LineTooShort,
    #[error("line too long")]
    LineTooLong,
    #[error("expected {expected:?}, got {actual:?}")]
    Expected { expected: String, actual: String },
    #[error("{}", invalid_token_message(.token, .byte, .context))]
    InvalidToken {
        token: &'static str,
        byte: Option<u8>,
        context: String,
    },
    #[error("type mismatch: expected {expected} near {context:?}")]
    TypeMismatch {
        expected: &'static str,
        context: String,
    },
    #[error("sequence number out of bounds")]
    SeqNoOutOfBounds,
    #[error("invalid part specifier")]
    InvalidPartSpecifier,
    #[error("unknown field {0:?}")]
    UnknownField(String),
    #[error("unknown flag {0:?}")]
    UnknownFlag(String),
    #[error("invalid search key")]
    InvalidSearchKey,
    #[error("invalid date {0:?}")]
    InvalidDate(String),
    #[error("literal of {0} bytes is too large")]
    LiteralTooLarge(u32),
    #[error(transparent)]
    Io(Arc<io::Error>),
}

/// The broad classes of `Error`, which determine how the connection layer
/// reacts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request is rejected but the connection stays open.
    Malformed,
    /// A token of one shape was found where another was required. Handled
    /// the same as `Malformed`.
    TypeMismatch,
    /// The connection is unusable.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::Io(_) => ErrorKind::Io,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            _ => ErrorKind::Malformed,
        }
    }

    /// Whether this error means the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        ErrorKind::Io == self.kind()
    }

    pub(crate) fn invalid_token(
        token: &'static str,
        byte: Option<u8>,
        context: &[u8],
    ) -> Self {
        Error::InvalidToken {
            token,
            byte,
            context: context_string(context),
        }
    }

    pub(crate) fn type_mismatch(
        expected: &'static str,
        context: &[u8],
    ) -> Self {
        Error::TypeMismatch {
            expected,
            context: context_string(context),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<io::ErrorKind> for Error {
    fn from(kind: io::ErrorKind) -> Self {
        io::Error::from(kind).into()
    }
}

fn invalid_token_message(
    token: &str,
    byte: &Option<u8>,
    context: &str,
) -> String {
    match *byte {
        Some(b) => format!(
            "invalid byte {:?} in {} near {:?}",
            char::from(b),
            token,
            context
        ),
        None => format!("invalid byte in {} near {:?}", token, context),
    }
}

/// Error messages go back to the client, so don't echo the whole line or the
/// line terminator.
fn context_string(context: &[u8]) -> String {
    let end = memchr::memchr2(b'\r', b'\n', context)
        .unwrap_or(context.len())
        .min(40);
    String::from_utf8_lossy(&context[..end]).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(ErrorKind::Malformed, Error::InvalidSearchKey.kind());
        assert_eq!(
            ErrorKind::TypeMismatch,
            Error::type_mismatch("quoted string", b"foo").kind()
        );
        let io: Error = io::ErrorKind::UnexpectedEof.into();
        assert_eq!(ErrorKind::Io, io.kind());
        assert!(io.is_fatal());
        assert!(!Error::LineTooShort.is_fatal());
    }

    #[test]
    fn messages() {
        assert_eq!(
            "invalid byte '{' in atom near \"fo{o\"",
            Error::invalid_token("atom", Some(b'{'), b"fo{o\r\n").to_string()
        );
        assert_eq!(
            "invalid byte in atom near \"\"",
            Error::invalid_token("atom", None, b"\r\n").to_string()
        );
        assert_eq!(
            "expected \"(\", got \"x\"",
            Error::Expected {
                expected: "(".to_owned(),
                actual: "x".to_owned(),
            }
            .to_string()
        );
    }
}
