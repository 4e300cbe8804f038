//! Engine-level error kinds (§7), layered on top of [`codec::Error`].
//!
//! Codec-level failures bubble up through [`From<codec::Error>`] and get a
//! status via the codec crate's own mapping; the kinds here are the ones
//! that only make sense once an object database and a context exist.

use codec::status::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Codec(codec::Error),
    NotFound,
    Unauthorized,
    Forbidden,
    MethodNotAllowed,
    UnsupportedFormat,
    Conflict,
    NotImplemented,
    TimedOut,
    InternalError,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<codec::Error> for Error {
    fn from(e: codec::Error) -> Self {
        Self::Codec(e)
    }
}

impl Error {
    /// Translate to the status byte a response should carry.
    pub fn status(self) -> StatusCode {
        match self {
            Self::Codec(e) => e.into(),
            Self::NotFound => StatusCode::NotFound,
            Self::Unauthorized => StatusCode::Unauthorized,
            Self::Forbidden => StatusCode::Forbidden,
            Self::MethodNotAllowed => StatusCode::MethodNotAllowed,
            Self::UnsupportedFormat => StatusCode::UnsupportedFormat,
            Self::Conflict => StatusCode::Conflict,
            Self::NotImplemented => StatusCode::NotImplemented,
            Self::TimedOut => StatusCode::Internal,
            Self::InternalError => StatusCode::Internal,
        }
    }
}
