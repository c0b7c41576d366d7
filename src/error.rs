use core::fmt;
use std::io;

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by [`Decoder::open`][crate::Decoder::open] and
/// [`Decoder::read`][crate::Decoder::read].
///
/// Use [`Error::kind`] to tell a malformed file apart from a valid JPEG that
/// uses features this decoder does not implement.
pub struct Error {
    repr: Repr,
}

pub(crate) enum Repr {
    /// The underlying byte source could not be opened or read.
    Io(io::Error),
    /// The input violates the JPEG container format.
    Structural(String),
    /// The input is a valid JPEG, but uses a feature this decoder does not
    /// implement.
    Unsupported(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    Io,
    Structural,
    Unsupported,
}

impl Error {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Self {
            repr: Repr::Structural(msg.into()),
        }
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Self {
            repr: Repr::Unsupported(msg.into()),
        }
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::Io(_) => ErrorKind::Io,
            Repr::Structural(_) => ErrorKind::Structural,
            Repr::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self { repr: Repr::Io(e) }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Io(e) => e.fmt(f),
            Repr::Structural(s) | Repr::Unsupported(s) => s.fmt(f),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Io(e) => e.fmt(f),
            Repr::Structural(s) | Repr::Unsupported(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for Error {}
