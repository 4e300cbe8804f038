//! ## ThingSet wire codec
//!
//! This crate carries everything about a ThingSet message that does not
//! need to know about the object database: the pooled buffer a message
//! lives in, the scratchpad union that retypes a buffer's tail as it moves
//! through decode/encode phases, the JSON tokenizer and CBOR codec used by
//! the text and binary encodings, typed primitive marshalling shared by
//! both, the command-octet tables used to classify a message's leading
//! byte, status codes, and COBS framing.
//!
//! [ThingSet specification]: https://github.com/ThingSet/thingset-spec

pub mod buffer;
pub mod cbor;
pub mod cobs;
pub mod command;
pub mod json;
pub mod primitive;
pub mod scratchpad;
pub mod status;

use std::{array::TryFromSliceError, str::Utf8Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The pool could not satisfy an allocation within the caller's timeout.
    OutOfMemory,
    /// A caller unreffed a buffer that already had a zero refcount.
    AlreadyUnref,
    /// Malformed input: bad magic, truncated header, bad UTF-8, ...
    InvalidInput,
    /// A JSON/CBOR value did not decode to the requested type.
    TypeMismatch,
    /// An integer did not fit in the narrower type requested.
    OutOfRange,
    /// Nesting went past the bounded encoder/decoder stack depth.
    TooDeep,
    /// A container was closed with the wrong number of elements.
    CountMismatch,
    /// A decoder iterator has not yet reached the end of its container.
    Again,
    /// Parse ran out of input before a complete value was seen.
    Incomplete,
    /// The scratchroom of the requested kind did not fit.
    TooLarge,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_: TryFromSliceError) -> Self {
        Self::InvalidInput
    }
}

impl From<Utf8Error> for Error {
    fn from(_: Utf8Error) -> Self {
        Self::InvalidInput
    }
}

/// A timeout in milliseconds. `0` and `u32::MAX` are reserved sentinels
/// meaning "return immediately" and "block indefinitely".
pub type TimeoutMs = u32;

pub const IMMEDIATE: TimeoutMs = 0;
pub const FOREVER: TimeoutMs = u32::MAX;
