//! JSON text encoding (C4 tokenizer plus the text halves of C6's typed
//! `add_T`/`pull_T` operations).
//!
//! Encoding writes compact JSON directly into the buffer's tail, tracking
//! comma placement in [`crate::scratchpad::JsonEncode`]. Decoding consumes
//! the flat token table a prior [`tokenize`] call left in
//! [`crate::scratchpad::JsonDecode`], walking it depth-first with a cursor
//! — a container's `child_count` tells the caller exactly how many tokens
//! to consume next, so there is no separate "end" call the way CBOR needs
//! one for indefinite-length containers.

pub mod tokenizer;

pub use tokenizer::tokenize;

use crate::{
    Error,
    buffer::Buffer,
    scratchpad::{JsonDecode, JsonEncode, JsonToken, JsonTokenKind, Scratchpad},
};

fn encoder(pad: &mut Scratchpad) -> Result<&mut JsonEncode, Error> {
    pad.json_encode_mut()
}

fn decoder(pad: &mut Scratchpad) -> Result<&mut JsonDecode, Error> {
    pad.json_decode_mut()
}

fn write_separator(buf: &Buffer, enc: &mut JsonEncode) -> Result<(), Error> {
    if enc.need_separator {
        buf.push(b",")?;
    }
    enc.need_separator = true;
    Ok(())
}

/// Write a bare key (used before `:` inside an object); does not count as
/// a value for separator purposes, the value that follows does.
pub fn add_key(buf: &Buffer, pad: &mut Scratchpad, key: &str) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    enc.need_separator = false;
    add_escaped_string(buf, key)?;
    buf.push(b":")
}

fn add_escaped_string(buf: &Buffer, text: &str) -> Result<(), Error> {
    buf.push(b"\"")?;
    for &byte in text.as_bytes() {
        match byte {
            b'"' => buf.push(b"\\\"")?,
            b'\\' => buf.push(b"\\\\")?,
            0x08 => buf.push(b"\\b")?,
            0x0C => buf.push(b"\\f")?,
            b'\n' => buf.push(b"\\n")?,
            b'\r' => buf.push(b"\\r")?,
            b'\t' => buf.push(b"\\t")?,
            b if b < 0x20 => {
                let mut tmp = [0u8; 6];
                let s = format_escape(b, &mut tmp);
                buf.push(s)?;
            }
            b => buf.push(&[b])?,
        }
    }
    buf.push(b"\"")
}

fn format_escape(byte: u8, tmp: &mut [u8; 6]) -> &[u8] {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    tmp[0] = b'\\';
    tmp[1] = b'u';
    tmp[2] = b'0';
    tmp[3] = b'0';
    tmp[4] = HEX[(byte >> 4) as usize];
    tmp[5] = HEX[(byte & 0xF) as usize];
    tmp
}

pub fn open_object(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    enc.depth += 1;
    enc.need_separator = false;
    buf.push(b"{")
}

pub fn end_object(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    let enc = encoder(pad)?;
    enc.depth = enc.depth.saturating_sub(1);
    enc.need_separator = true;
    buf.push(b"}")
}

pub fn open_array(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    enc.depth += 1;
    enc.need_separator = false;
    buf.push(b"[")
}

pub fn end_array(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    let enc = encoder(pad)?;
    enc.depth = enc.depth.saturating_sub(1);
    enc.need_separator = true;
    buf.push(b"]")
}

pub fn add_bool(buf: &Buffer, pad: &mut Scratchpad, value: bool) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    buf.push(if value { b"true" } else { b"false" })
}

pub fn add_null(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    buf.push(b"null")
}

pub fn add_str(buf: &Buffer, pad: &mut Scratchpad, text: &str) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    add_escaped_string(buf, text)
}

pub fn add_u64(buf: &Buffer, pad: &mut Scratchpad, value: u64) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    buf.push(value.to_string().as_bytes())
}

pub fn add_i64(buf: &Buffer, pad: &mut Scratchpad, value: i64) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    buf.push(value.to_string().as_bytes())
}

/// NaN/Inf emit as `null` (§4.6); otherwise rendered to `precision` decimal
/// places, matching the original's `"%.*f"` formatting.
pub fn add_f32(buf: &Buffer, pad: &mut Scratchpad, value: f32, precision: u8) -> Result<(), Error> {
    if value.is_nan() || value.is_infinite() {
        return add_null(buf, pad);
    }
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    buf.push(format!("{value:.*}", precision as usize).as_bytes())
}

pub fn add_decfrac(buf: &Buffer, pad: &mut Scratchpad, exponent: i8, mantissa: i64) -> Result<(), Error> {
    let enc = encoder(pad)?;
    write_separator(buf, enc)?;
    if exponent >= 0 {
        let scale = 10i64.checked_pow(exponent as u32).ok_or(Error::OutOfRange)?;
        let value = mantissa.checked_mul(scale).ok_or(Error::OutOfRange)?;
        return buf.push(value.to_string().as_bytes());
    }
    let digits = (-exponent) as usize;
    let negative = mantissa < 0;
    let magnitude = mantissa.unsigned_abs();
    let s = magnitude.to_string();
    let s = if s.len() <= digits { format!("{}{}", "0".repeat(digits - s.len() + 1), s) } else { s };
    let split = s.len() - digits;
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&s[..split]);
    out.push('.');
    out.push_str(&s[split..]);
    buf.push(out.as_bytes())
}

fn token(pad: &mut Scratchpad) -> Result<JsonToken, Error> {
    let dec = decoder(pad)?;
    let tok = *dec.tokens.get(dec.cursor).ok_or(Error::Incomplete)?;
    dec.cursor += 1;
    Ok(tok)
}

fn token_text<'a>(buf: &'a Buffer, tok: JsonToken) -> Result<String, Error> {
    buf.with_payload(|p| -> Result<String, Error> {
        let slice = p.get(tok.start..tok.start + tok.length).ok_or(Error::Incomplete)?;
        Ok(std::str::from_utf8(slice)?.to_owned())
    })
}

pub fn pull_str(buf: &Buffer, pad: &mut Scratchpad) -> Result<String, Error> {
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::String {
        return Err(Error::TypeMismatch);
    }
    token_text(buf, tok)
}

pub fn pull_bool(buf: &Buffer, pad: &mut Scratchpad) -> Result<bool, Error> {
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::Primitive {
        return Err(Error::TypeMismatch);
    }
    match token_text(buf, tok)?.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::TypeMismatch),
    }
}

pub fn pull_null(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::Primitive || token_text(buf, tok)? != "null" {
        return Err(Error::TypeMismatch);
    }
    Ok(())
}

pub fn pull_i64(buf: &Buffer, pad: &mut Scratchpad) -> Result<i64, Error> {
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::Primitive {
        return Err(Error::TypeMismatch);
    }
    token_text(buf, tok)?.parse::<i64>().map_err(|_| Error::TypeMismatch)
}

pub fn pull_u64(buf: &Buffer, pad: &mut Scratchpad) -> Result<u64, Error> {
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::Primitive {
        return Err(Error::TypeMismatch);
    }
    token_text(buf, tok)?.parse::<u64>().map_err(|_| Error::TypeMismatch)
}

/// `null` decodes to NaN (§4.6); any other primitive is parsed as a float.
pub fn pull_f32(buf: &Buffer, pad: &mut Scratchpad) -> Result<f32, Error> {
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::Primitive {
        return Err(Error::TypeMismatch);
    }
    let text = token_text(buf, tok)?;
    if text == "null" {
        return Ok(f32::NAN);
    }
    text.parse::<f64>().map(|v| v as f32).map_err(|_| Error::TypeMismatch)
}

/// Enter an object token, returning its child (key-value pair) count.
pub fn pull_object(buf: &Buffer, pad: &mut Scratchpad) -> Result<u16, Error> {
    let _ = buf;
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::Object {
        return Err(Error::TypeMismatch);
    }
    Ok(tok.child_count)
}

/// Enter an array token, returning its element count.
pub fn pull_array(buf: &Buffer, pad: &mut Scratchpad) -> Result<u16, Error> {
    let _ = buf;
    let tok = token(pad)?;
    if tok.kind != JsonTokenKind::Array {
        return Err(Error::TypeMismatch);
    }
    Ok(tok.child_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::scratchpad::JsonDecode;

    #[test]
    fn encode_flat_object() {
        let pool = BufferPool::new(1, 128);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = Scratchpad::JsonEncode(JsonEncode::default());
        open_object(&buf, &mut pad).unwrap();
        add_key(&buf, &mut pad, "Bat_V").unwrap();
        add_f32(&buf, &mut pad, 14.1, 2).unwrap();
        add_key(&buf, &mut pad, "Bat_A").unwrap();
        add_f32(&buf, &mut pad, 5.13, 2).unwrap();
        end_object(&buf, &mut pad).unwrap();

        buf.with_payload(|p| {
            assert_eq!(std::str::from_utf8(p).unwrap(), r#"{"Bat_V":14.10,"Bat_A":5.13}"#);
        });
    }

    #[test]
    fn nan_emits_as_null_and_back() {
        let pool = BufferPool::new(1, 32);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = Scratchpad::JsonEncode(JsonEncode::default());
        add_f32(&buf, &mut pad, f32::NAN, 2).unwrap();
        buf.with_payload(|p| assert_eq!(p, b"null"));

        let mut tokens = Vec::with_capacity(16);
        buf.with_payload(|p| tokenize(p, &mut tokens).unwrap());
        let mut pad = Scratchpad::JsonDecode(JsonDecode { tokens, cursor: 0 });
        assert!(pull_f32(&buf, &mut pad).unwrap().is_nan());
    }

    #[test]
    fn decode_object_roundtrip() {
        let pool = BufferPool::new(1, 128);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(br#"{"a":1,"b":"two"}"#).unwrap();

        let mut tokens = Vec::with_capacity(16);
        buf.with_payload(|p| tokenize(p, &mut tokens).unwrap());
        let mut pad = Scratchpad::JsonDecode(JsonDecode { tokens, cursor: 0 });

        let n = pull_object(&buf, &mut pad).unwrap();
        assert_eq!(n, 2);
        assert_eq!(pull_str(&buf, &mut pad).unwrap(), "a");
        assert_eq!(pull_i64(&buf, &mut pad).unwrap(), 1);
        assert_eq!(pull_str(&buf, &mut pad).unwrap(), "b");
        assert_eq!(pull_str(&buf, &mut pad).unwrap(), "two");
    }
}
