//! Scratchpad union (C3).
//!
//! The original carves a discriminated union out of a buffer's tail bytes,
//! reusing the same storage for whichever phase a message is currently in.
//! Here the per-phase state is instead an owning, tagged [`Scratchpad`]
//! enum held beside the [`crate::buffer::Buffer`] it describes — no
//! aliasing, no alignment tricks, and the compiler (not a debug assert)
//! rejects access through the wrong variant.
//!
//! A message carries exactly one scratchpad at a time; transitions happen
//! at the well-defined points the request/response pipeline calls out:
//! decode flips `Raw` to `JsonDecode`/`CborDecode`, response building flips
//! to the matching `*Encode`, and COBS framing swaps to/from `Cobs`.

use crate::Error;

/// Minimum number of JSON tokens a `JsonDecode` scratchpad must be able to
/// hold, per §4.3.
pub const MIN_JSON_TOKENS: usize = 16;

/// Bounded nesting depth for the CBOR encoder/decoder stacks (top,
/// container, inner), per §4.5.
pub const CBOR_STACK_DEPTH: usize = 3;

/// `processing` scratchpad payload: routing metadata attached to a message
/// while it is in flight between decode and dispatch, per §3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Processing {
    pub source_port: u8,
    pub dest_port: u8,
    pub peer_uid: u64,
    pub response_size_hint: usize,
}

/// One level of the bounded CBOR nesting stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CborFrame {
    /// A definite-length array or map; `remaining` counts elements (map
    /// pairs count as one element per key+value per §4.5, i.e. two raw
    /// `add_*`/`pull_*` calls per entry) still expected before `end`.
    Array { remaining: u32 },
    Map { remaining: u32 },
    /// An indefinite-length container (`n = 0` at open); closed by a CBOR
    /// break byte rather than a count.
    Indefinite,
}

/// CBOR encoder state: a bounded stack of open containers.
#[derive(Debug, Clone, Default)]
pub struct CborEncode {
    stack: Vec<CborFrame>,
}

impl CborEncode {
    pub fn open(&mut self, frame: CborFrame) -> Result<(), Error> {
        if self.stack.len() >= CBOR_STACK_DEPTH {
            return Err(Error::TooDeep);
        }
        self.stack.push(frame);
        Ok(())
    }

    /// Record one element written into the innermost open container.
    pub fn count_element(&mut self) -> Result<(), Error> {
        match self.stack.last_mut() {
            Some(CborFrame::Array { remaining }) | Some(CborFrame::Map { remaining }) => {
                if *remaining == 0 {
                    return Err(Error::CountMismatch);
                }
                *remaining -= 1;
                Ok(())
            }
            Some(CborFrame::Indefinite) => Ok(()),
            None => Ok(()),
        }
    }

    pub fn end(&mut self) -> Result<(), Error> {
        match self.stack.pop() {
            Some(CborFrame::Array { remaining: 0 }) | Some(CborFrame::Map { remaining: 0 }) => Ok(()),
            Some(CborFrame::Indefinite) => Ok(()),
            Some(_) => Err(Error::CountMismatch),
            None => Err(Error::CountMismatch),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// CBOR decoder state: the same bounded stack, mirrored for iteration.
#[derive(Debug, Clone, Default)]
pub struct CborDecode {
    stack: Vec<CborFrame>,
}

impl CborDecode {
    pub fn enter(&mut self, frame: CborFrame) -> Result<(), Error> {
        if self.stack.len() >= CBOR_STACK_DEPTH {
            return Err(Error::TooDeep);
        }
        self.stack.push(frame);
        Ok(())
    }

    /// `true` once the innermost open container has yielded its last
    /// element (definite length reached zero) or hit a break byte.
    pub fn at_end(&self) -> bool {
        matches!(self.stack.last(), Some(CborFrame::Array { remaining: 0 }) | Some(CborFrame::Map { remaining: 0 }))
    }

    pub fn take_element(&mut self) -> Result<(), Error> {
        match self.stack.last_mut() {
            Some(CborFrame::Array { remaining }) | Some(CborFrame::Map { remaining }) => {
                if *remaining == 0 {
                    return Err(Error::Again);
                }
                *remaining -= 1;
                Ok(())
            }
            Some(CborFrame::Indefinite) => Ok(()),
            None => Err(Error::Again),
        }
    }

    pub fn leave(&mut self) -> Result<(), Error> {
        if !self.at_end() && !matches!(self.stack.last(), Some(CborFrame::Indefinite)) {
            return Err(Error::Again);
        }
        self.stack.pop();
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// One recorded JSON token, mirroring the original's compact token record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonToken {
    pub kind: JsonTokenKind,
    pub start: usize,
    pub length: usize,
    pub child_count: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonTokenKind {
    Object,
    Array,
    String,
    Primitive,
}

/// JSON decode scratchpad: the token table plus a read cursor into it.
#[derive(Debug, Clone, Default)]
pub struct JsonDecode {
    pub tokens: Vec<JsonToken>,
    pub cursor: usize,
}

impl JsonDecode {
    pub fn with_capacity(tokens: usize) -> Result<Self, Error> {
        if tokens < MIN_JSON_TOKENS {
            return Err(Error::TooLarge);
        }
        Ok(Self { tokens: Vec::with_capacity(tokens), cursor: 0 })
    }
}

/// JSON encode scratchpad: tracks whether a separator is due and the
/// nesting of currently-open `{`/`[` containers (for trailing-comma-free
/// output and indentation-free compact encoding).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonEncode {
    pub depth: u8,
    pub need_separator: bool,
}

/// COBS scratchpad: the single-byte lookahead the streaming encoder/decoder
/// needs between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cobs {
    pub code: u8,
    pub since_code: u8,
}

/// The per-message scratchpad, exactly one variant live at a time.
#[derive(Debug, Clone)]
pub enum Scratchpad {
    Raw,
    Processing(Processing),
    JsonEncode(JsonEncode),
    JsonDecode(JsonDecode),
    CborEncode(CborEncode),
    CborDecode(CborDecode),
    Cobs(Cobs),
}

impl Scratchpad {
    pub fn processing(&self) -> Result<&Processing, Error> {
        match self {
            Self::Processing(p) => Ok(p),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn processing_mut(&mut self) -> Result<&mut Processing, Error> {
        match self {
            Self::Processing(p) => Ok(p),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn json_encode_mut(&mut self) -> Result<&mut JsonEncode, Error> {
        match self {
            Self::JsonEncode(s) => Ok(s),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn json_decode(&self) -> Result<&JsonDecode, Error> {
        match self {
            Self::JsonDecode(s) => Ok(s),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn json_decode_mut(&mut self) -> Result<&mut JsonDecode, Error> {
        match self {
            Self::JsonDecode(s) => Ok(s),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn cbor_encode_mut(&mut self) -> Result<&mut CborEncode, Error> {
        match self {
            Self::CborEncode(s) => Ok(s),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn cbor_decode_mut(&mut self) -> Result<&mut CborDecode, Error> {
        match self {
            Self::CborDecode(s) => Ok(s),
            _ => Err(Error::TypeMismatch),
        }
    }

    pub fn cobs_mut(&mut self) -> Result<&mut Cobs, Error> {
        match self {
            Self::Cobs(s) => Ok(s),
            _ => Err(Error::TypeMismatch),
        }
    }
}
