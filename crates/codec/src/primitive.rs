//! Primitive marshalling (C6): the typed `add_T`/`pull_T` surface shared by
//! both wire encodings. Each function dispatches on which scratchpad
//! variant is live and otherwise has no encoding-specific knowledge;
//! [`crate::json`] and [`crate::cbor`] do the actual byte work.
//!
//! Integer pulls narrow with range checking — `pull_u16` on a value that
//! does not fit reports [`Error::OutOfRange`], never truncates. `f32` pulls
//! accept either a native float or any integer and widen.

use crate::{Error, buffer::Buffer, cbor, json, scratchpad::Scratchpad};

macro_rules! dispatch_add {
    ($name:ident, $arg_ty:ty, $json_fn:path, $cbor_fn:path) => {
        pub fn $name(buf: &Buffer, pad: &mut Scratchpad, value: $arg_ty) -> Result<(), Error> {
            match pad {
                Scratchpad::JsonEncode(_) => $json_fn(buf, pad, value),
                Scratchpad::CborEncode(_) => $cbor_fn(buf, pad, value),
                _ => Err(Error::TypeMismatch),
            }
        }
    };
}

macro_rules! dispatch_pull {
    ($name:ident, $ret_ty:ty, $json_fn:path, $cbor_fn:path) => {
        pub fn $name(buf: &Buffer, pad: &mut Scratchpad) -> Result<$ret_ty, Error> {
            match pad {
                Scratchpad::JsonDecode(_) => $json_fn(buf, pad),
                Scratchpad::CborDecode(_) => $cbor_fn(buf, pad),
                _ => Err(Error::TypeMismatch),
            }
        }
    };
}

dispatch_add!(add_bool, bool, json::add_bool, cbor::add_bool);
dispatch_add!(add_u64, u64, json::add_u64, cbor::add_uint);
dispatch_add!(add_i64, i64, json::add_i64, cbor::add_int);

/// `precision` names the text encoding's decimal-place count; the binary
/// encoding ignores it and always writes the exact value.
pub fn add_f32(buf: &Buffer, pad: &mut Scratchpad, value: f32, precision: u8) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::add_f32(buf, pad, value, precision),
        Scratchpad::CborEncode(_) => cbor::add_f32(buf, pad, value),
        _ => Err(Error::TypeMismatch),
    }
}

dispatch_pull!(pull_bool, bool, json::pull_bool, cbor::pull_bool);
dispatch_pull!(pull_f32_raw, f32, json::pull_f32, cbor::pull_f32);
dispatch_pull!(pull_u64, u64, json::pull_u64, cbor::pull_uint);
dispatch_pull!(pull_i64, i64, json::pull_i64, cbor::pull_int);

pub fn add_str(buf: &Buffer, pad: &mut Scratchpad, text: &str) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::add_str(buf, pad, text),
        Scratchpad::CborEncode(_) => cbor::add_tstr(buf, pad, text),
        _ => Err(Error::TypeMismatch),
    }
}

/// Borrows the decoded string from the buffer's payload — per §4.6 the
/// caller must copy it out before the buffer is released back to the pool.
pub fn pull_str(buf: &Buffer, pad: &mut Scratchpad) -> Result<String, Error> {
    match pad {
        Scratchpad::JsonDecode(_) => json::pull_str(buf, pad),
        Scratchpad::CborDecode(_) => cbor::pull_tstr(buf, pad),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn add_bytes(buf: &Buffer, pad: &mut Scratchpad, bytes: &[u8]) -> Result<(), Error> {
    match pad {
        Scratchpad::CborEncode(_) => cbor::add_bstr(buf, pad, bytes),
        // The text encoding has no byte-string literal; base64 is out of
        // scope (§1 non-goals list no encoding variants beyond the two
        // named wire formats), so this combination is unsupported.
        Scratchpad::JsonEncode(_) => Err(Error::TypeMismatch),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn pull_bytes(buf: &Buffer, pad: &mut Scratchpad) -> Result<Vec<u8>, Error> {
    match pad {
        Scratchpad::CborDecode(_) => cbor::pull_bstr(buf, pad),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn add_decfrac(buf: &Buffer, pad: &mut Scratchpad, exponent: i8, mantissa: i64) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::add_decfrac(buf, pad, exponent, mantissa),
        Scratchpad::CborEncode(_) => cbor::add_decfrac(buf, pad, exponent, mantissa),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn pull_decfrac(buf: &Buffer, pad: &mut Scratchpad) -> Result<(i8, i64), Error> {
    match pad {
        Scratchpad::CborDecode(_) => cbor::pull_decfrac(buf, pad),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn add_null(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::add_null(buf, pad),
        Scratchpad::CborEncode(_) => cbor::add_null(buf, pad),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn open_array(buf: &Buffer, pad: &mut Scratchpad, len: u32) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::open_array(buf, pad),
        Scratchpad::CborEncode(_) => cbor::open_array(buf, pad, len),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn end_array(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::end_array(buf, pad),
        Scratchpad::CborEncode(_) => cbor::end_container(pad),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn open_map(buf: &Buffer, pad: &mut Scratchpad, pairs: u32) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::open_object(buf, pad),
        Scratchpad::CborEncode(_) => cbor::open_map(buf, pad, pairs),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn end_map(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::end_object(buf, pad),
        Scratchpad::CborEncode(_) => cbor::end_container(pad),
        _ => Err(Error::TypeMismatch),
    }
}

/// JSON object keys are written inline with their value by the response
/// builder; CBOR map keys are ordinary `add_*` calls. This helper exists so
/// callers can write one loop over `(key, value)` pairs regardless of
/// encoding.
pub fn add_map_key(buf: &Buffer, pad: &mut Scratchpad, key: &str) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonEncode(_) => json::add_key(buf, pad, key),
        Scratchpad::CborEncode(_) => cbor::add_tstr(buf, pad, key),
        _ => Err(Error::TypeMismatch),
    }
}

/// Enter a map/object and report its pair count.
pub fn pull_map(buf: &Buffer, pad: &mut Scratchpad) -> Result<u32, Error> {
    match pad {
        Scratchpad::JsonDecode(_) => json::pull_object(buf, pad).map(u32::from),
        Scratchpad::CborDecode(_) => cbor::pull_map(buf, pad),
        _ => Err(Error::TypeMismatch),
    }
}

/// Enter an array and report its element count.
pub fn pull_array(buf: &Buffer, pad: &mut Scratchpad) -> Result<u32, Error> {
    match pad {
        Scratchpad::JsonDecode(_) => json::pull_array(buf, pad).map(u32::from),
        Scratchpad::CborDecode(_) => cbor::pull_array(buf, pad),
        _ => Err(Error::TypeMismatch),
    }
}

/// Leave a container entered with [`pull_map`]/[`pull_array`]. A no-op for
/// JSON (the token's `child_count` already bounded iteration); CBOR needs
/// it to pop its nesting stack.
pub fn end_container(_buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    match pad {
        Scratchpad::JsonDecode(_) => Ok(()),
        Scratchpad::CborDecode(_) => cbor::pull_container_end(pad),
        _ => Err(Error::TypeMismatch),
    }
}

/// `f32` accepts either a native float or any integer and widens (§4.6).
pub fn pull_f32(buf: &Buffer, pad: &mut Scratchpad) -> Result<f32, Error> {
    match pull_f32_raw(buf, pad) {
        Ok(v) => Ok(v),
        Err(Error::TypeMismatch) => pull_i64(buf, pad).map(|v| v as f32),
        Err(e) => Err(e),
    }
}

macro_rules! narrow_pull {
    ($name:ident, $ty:ty, unsigned) => {
        pub fn $name(buf: &Buffer, pad: &mut Scratchpad) -> Result<$ty, Error> {
            let v = pull_u64(buf, pad)?;
            <$ty>::try_from(v).map_err(|_| Error::OutOfRange)
        }
    };
    ($name:ident, $ty:ty, signed) => {
        pub fn $name(buf: &Buffer, pad: &mut Scratchpad) -> Result<$ty, Error> {
            let v = pull_i64(buf, pad)?;
            <$ty>::try_from(v).map_err(|_| Error::OutOfRange)
        }
    };
}

narrow_pull!(pull_u8, u8, unsigned);
narrow_pull!(pull_u16, u16, unsigned);
narrow_pull!(pull_u32, u32, unsigned);
narrow_pull!(pull_i8, i8, signed);
narrow_pull!(pull_i16, i16, signed);
narrow_pull!(pull_i32, i32, signed);

pub fn add_u8(buf: &Buffer, pad: &mut Scratchpad, v: u8) -> Result<(), Error> {
    add_u64(buf, pad, v as u64)
}
pub fn add_u16(buf: &Buffer, pad: &mut Scratchpad, v: u16) -> Result<(), Error> {
    add_u64(buf, pad, v as u64)
}
pub fn add_u32(buf: &Buffer, pad: &mut Scratchpad, v: u32) -> Result<(), Error> {
    add_u64(buf, pad, v as u64)
}
pub fn add_i8(buf: &Buffer, pad: &mut Scratchpad, v: i8) -> Result<(), Error> {
    add_i64(buf, pad, v as i64)
}
pub fn add_i16(buf: &Buffer, pad: &mut Scratchpad, v: i16) -> Result<(), Error> {
    add_i64(buf, pad, v as i64)
}
pub fn add_i32(buf: &Buffer, pad: &mut Scratchpad, v: i32) -> Result<(), Error> {
    add_i64(buf, pad, v as i64)
}
