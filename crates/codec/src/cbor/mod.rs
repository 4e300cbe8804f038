//! CBOR codec (C5): value-by-value encode/decode over a [`Buffer`]'s tail,
//! with nested containers tracked by the bounded stack in
//! [`crate::scratchpad::CborEncode`] / [`CborDecode`].
//!
//! This module speaks raw CBOR major types and heads; [`crate::primitive`]
//! is the typed `add_T`/`pull_T` surface callers actually use.

mod head;

pub use head::{MajorType, decode_head, encode_head};

use crate::{
    Error,
    buffer::Buffer,
    scratchpad::{CborDecode, CborEncode, CborFrame, Scratchpad},
};

/// CBOR tag for a decimal fraction, RFC 8949 §3.4.4.
pub const TAG_DECIMAL_FRACTION: u64 = 4;

fn encoder(pad: &mut Scratchpad) -> Result<&mut CborEncode, Error> {
    pad.cbor_encode_mut()
}

fn decoder(pad: &mut Scratchpad) -> Result<&mut CborDecode, Error> {
    pad.cbor_decode_mut()
}

pub fn add_uint(buf: &Buffer, pad: &mut Scratchpad, value: u64) -> Result<(), Error> {
    let mut tmp = [0u8; 9];
    let n = encode_head(&mut tmp, MajorType::Uint, value);
    buf.push(&tmp[..n])?;
    encoder(pad)?.count_element()
}

pub fn add_nint(buf: &Buffer, pad: &mut Scratchpad, value: i64) -> Result<(), Error> {
    debug_assert!(value < 0);
    let magnitude = (-1 - value) as u64;
    let mut tmp = [0u8; 9];
    let n = encode_head(&mut tmp, MajorType::Nint, magnitude);
    buf.push(&tmp[..n])?;
    encoder(pad)?.count_element()
}

pub fn add_int(buf: &Buffer, pad: &mut Scratchpad, value: i64) -> Result<(), Error> {
    if value < 0 { add_nint(buf, pad, value) } else { add_uint(buf, pad, value as u64) }
}

pub fn add_bstr(buf: &Buffer, pad: &mut Scratchpad, bytes: &[u8]) -> Result<(), Error> {
    let mut tmp = [0u8; 9];
    let n = encode_head(&mut tmp, MajorType::Bstr, bytes.len() as u64);
    buf.push(&tmp[..n])?;
    buf.push(bytes)?;
    encoder(pad)?.count_element()
}

pub fn add_tstr(buf: &Buffer, pad: &mut Scratchpad, text: &str) -> Result<(), Error> {
    let mut tmp = [0u8; 9];
    let n = encode_head(&mut tmp, MajorType::Tstr, text.len() as u64);
    buf.push(&tmp[..n])?;
    buf.push(text.as_bytes())?;
    encoder(pad)?.count_element()
}

pub fn add_bool(buf: &Buffer, pad: &mut Scratchpad, value: bool) -> Result<(), Error> {
    buf.push(&[if value { 0xF5 } else { 0xF4 }])?;
    encoder(pad)?.count_element()
}

pub fn add_null(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    buf.push(&[0xF6])?;
    encoder(pad)?.count_element()
}

pub fn add_f32(buf: &Buffer, pad: &mut Scratchpad, value: f32) -> Result<(), Error> {
    let mut tmp = [0u8; 5];
    tmp[0] = 0xFA;
    tmp[1..].copy_from_slice(&value.to_be_bytes());
    buf.push(&tmp)?;
    encoder(pad)?.count_element()
}

/// Decimal fraction: tag 4 followed by a two-element array `[exponent,
/// mantissa]` (§4.5).
pub fn add_decfrac(buf: &Buffer, pad: &mut Scratchpad, exponent: i8, mantissa: i64) -> Result<(), Error> {
    let mut tmp = [0u8; 9];
    let n = encode_head(&mut tmp, MajorType::Tag, TAG_DECIMAL_FRACTION);
    buf.push(&tmp[..n])?;
    let n = encode_head(&mut tmp, MajorType::Array, 2);
    buf.push(&tmp[..n])?;
    add_int(buf, pad, exponent as i64)?;
    add_int(buf, pad, mantissa)
}

pub fn open_array(buf: &Buffer, pad: &mut Scratchpad, len: u32) -> Result<(), Error> {
    let mut tmp = [0u8; 9];
    let n = encode_head(&mut tmp, MajorType::Array, len as u64);
    buf.push(&tmp[..n])?;
    let enc = encoder(pad)?;
    enc.count_element()?;
    enc.open(CborFrame::Array { remaining: len })
}

pub fn open_map(buf: &Buffer, pad: &mut Scratchpad, pairs: u32) -> Result<(), Error> {
    let mut tmp = [0u8; 9];
    let n = encode_head(&mut tmp, MajorType::Map, pairs as u64);
    buf.push(&tmp[..n])?;
    let enc = encoder(pad)?;
    enc.count_element()?;
    enc.open(CborFrame::Map { remaining: pairs })
}

pub fn end_container(pad: &mut Scratchpad) -> Result<(), Error> {
    encoder(pad)?.end()
}

/// Read the next value's head without consuming anything beyond the head
/// bytes; callers use the returned `(major, arg)` to decide which typed
/// `pull_*` to call next.
pub fn peek_head(buf: &Buffer) -> Result<(MajorType, u64, usize), Error> {
    buf.with_payload(|p| decode_head(p))
}

pub fn pull_uint(buf: &Buffer, pad: &mut Scratchpad) -> Result<u64, Error> {
    let (major, value, len) = peek_head(buf)?;
    if major != MajorType::Uint {
        return Err(Error::TypeMismatch);
    }
    buf.remove_front(len)?;
    decoder(pad)?.take_element()?;
    Ok(value)
}

pub fn pull_int(buf: &Buffer, pad: &mut Scratchpad) -> Result<i64, Error> {
    let (major, value, len) = peek_head(buf)?;
    match major {
        MajorType::Uint => {
            let v = i64::try_from(value).map_err(|_| Error::OutOfRange)?;
            buf.remove_front(len)?;
            decoder(pad)?.take_element()?;
            Ok(v)
        }
        MajorType::Nint => {
            let v = -1i64 - i64::try_from(value).map_err(|_| Error::OutOfRange)?;
            buf.remove_front(len)?;
            decoder(pad)?.take_element()?;
            Ok(v)
        }
        _ => Err(Error::TypeMismatch),
    }
}

pub fn pull_bool(buf: &Buffer, pad: &mut Scratchpad) -> Result<bool, Error> {
    let (major, value, len) = peek_head(buf)?;
    if major != MajorType::Simple || (value != 20 && value != 21) {
        return Err(Error::TypeMismatch);
    }
    buf.remove_front(len)?;
    decoder(pad)?.take_element()?;
    Ok(value == 21)
}

pub fn pull_null(buf: &Buffer, pad: &mut Scratchpad) -> Result<(), Error> {
    let (major, value, len) = peek_head(buf)?;
    if major != MajorType::Simple || value != 22 {
        return Err(Error::TypeMismatch);
    }
    buf.remove_front(len)?;
    decoder(pad)?.take_element()
}

pub fn pull_f32(buf: &Buffer, pad: &mut Scratchpad) -> Result<f32, Error> {
    let out = buf.with_payload(|p| -> Result<(f32, usize), Error> {
        if p.is_empty() {
            return Err(Error::Incomplete);
        }
        match p[0] {
            0xFA => {
                if p.len() < 5 {
                    return Err(Error::Incomplete);
                }
                Ok((f32::from_be_bytes(p[1..5].try_into()?), 5))
            }
            0xF9 => {
                if p.len() < 3 {
                    return Err(Error::Incomplete);
                }
                Ok((half_to_f32(u16::from_be_bytes(p[1..3].try_into()?)), 3))
            }
            0xFB => {
                if p.len() < 9 {
                    return Err(Error::Incomplete);
                }
                Ok((f64::from_be_bytes(p[1..9].try_into()?) as f32, 9))
            }
            b if b <= 0x1B && (b & 0xE0) <= 0x20 => {
                let (_, v, len) = decode_head(p)?;
                Ok((v as f32, len))
            }
            0x20..=0x3B => {
                let (_, v, len) = decode_head(p)?;
                Ok((-1.0 - v as f32, len))
            }
            _ => Err(Error::TypeMismatch),
        }
    })?;
    buf.remove_front(out.1)?;
    decoder(pad)?.take_element()?;
    Ok(out.0)
}

fn half_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) & 1) as u32;
    let exp = ((bits >> 10) & 0x1F) as u32;
    let frac = (bits & 0x3FF) as u32;
    let f = if exp == 0 {
        (frac as f32) * 2f32.powi(-24)
    } else if exp == 0x1F {
        if frac == 0 { f32::INFINITY } else { f32::NAN }
    } else {
        (1.0 + frac as f32 / 1024.0) * 2f32.powi(exp as i32 - 15)
    };
    if sign == 1 { -f } else { f }
}

pub fn pull_bstr<'a>(buf: &'a Buffer, pad: &mut Scratchpad) -> Result<Vec<u8>, Error> {
    let (major, len, head_len) = peek_head(buf)?;
    if major != MajorType::Bstr {
        return Err(Error::TypeMismatch);
    }
    let len = len as usize;
    let out = buf.with_payload(|p| -> Result<Vec<u8>, Error> {
        if p.len() < head_len + len {
            return Err(Error::Incomplete);
        }
        Ok(p[head_len..head_len + len].to_vec())
    })?;
    buf.remove_front(head_len + len)?;
    decoder(pad)?.take_element()?;
    Ok(out)
}

pub fn pull_tstr(buf: &Buffer, pad: &mut Scratchpad) -> Result<String, Error> {
    let (major, len, head_len) = peek_head(buf)?;
    if major != MajorType::Tstr {
        return Err(Error::TypeMismatch);
    }
    let len = len as usize;
    let out = buf.with_payload(|p| -> Result<String, Error> {
        if p.len() < head_len + len {
            return Err(Error::Incomplete);
        }
        Ok(std::str::from_utf8(&p[head_len..head_len + len])?.to_owned())
    })?;
    buf.remove_front(head_len + len)?;
    decoder(pad)?.take_element()?;
    Ok(out)
}

pub fn pull_array(buf: &Buffer, pad: &mut Scratchpad) -> Result<u32, Error> {
    let (major, len, head_len) = peek_head(buf)?;
    if major != MajorType::Array {
        return Err(Error::TypeMismatch);
    }
    buf.remove_front(head_len)?;
    decoder(pad)?.take_element()?;
    decoder(pad)?.enter(CborFrame::Array { remaining: len as u32 })?;
    Ok(len as u32)
}

pub fn pull_map(buf: &Buffer, pad: &mut Scratchpad) -> Result<u32, Error> {
    let (major, len, head_len) = peek_head(buf)?;
    if major != MajorType::Map {
        return Err(Error::TypeMismatch);
    }
    buf.remove_front(head_len)?;
    decoder(pad)?.take_element()?;
    decoder(pad)?.enter(CborFrame::Map { remaining: len as u32 })?;
    Ok(len as u32)
}

pub fn pull_container_end(pad: &mut Scratchpad) -> Result<(), Error> {
    decoder(pad)?.leave()
}

pub fn pull_decfrac(buf: &Buffer, pad: &mut Scratchpad) -> Result<(i8, i64), Error> {
    let (major, tag, head_len) = peek_head(buf)?;
    if major != MajorType::Tag || tag != TAG_DECIMAL_FRACTION {
        return Err(Error::TypeMismatch);
    }
    buf.remove_front(head_len)?;
    let n = pull_array(buf, pad)?;
    if n != 2 {
        return Err(Error::CountMismatch);
    }
    let exponent = pull_int(buf, pad)?;
    let mantissa = pull_int(buf, pad)?;
    pull_container_end(pad)?;
    let exponent = i8::try_from(exponent).map_err(|_| Error::OutOfRange)?;
    Ok((exponent, mantissa))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;

    fn enc_pad() -> Scratchpad {
        Scratchpad::CborEncode(CborEncode::default())
    }

    fn dec_pad() -> Scratchpad {
        Scratchpad::CborDecode(CborDecode::default())
    }

    #[test]
    fn uint_roundtrip() {
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = enc_pad();
        add_uint(&buf, &mut pad, 1000).unwrap();

        let mut pad = dec_pad();
        assert_eq!(pull_uint(&buf, &mut pad).unwrap(), 1000);
    }

    #[test]
    fn negative_int_roundtrip() {
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = enc_pad();
        add_int(&buf, &mut pad, -500).unwrap();

        let mut pad = dec_pad();
        assert_eq!(pull_int(&buf, &mut pad).unwrap(), -500);
    }

    #[test]
    fn array_of_two_floats() {
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = enc_pad();
        open_array(&buf, &mut pad, 2).unwrap();
        add_f32(&buf, &mut pad, 14.1).unwrap();
        add_f32(&buf, &mut pad, 5.13).unwrap();
        end_container(&mut pad).unwrap();

        let mut pad = dec_pad();
        let n = pull_array(&buf, &mut pad).unwrap();
        assert_eq!(n, 2);
        assert!((pull_f32(&buf, &mut pad).unwrap() - 14.1).abs() < 1e-5);
        assert!((pull_f32(&buf, &mut pad).unwrap() - 5.13).abs() < 1e-5);
        pull_container_end(&mut pad).unwrap();
    }

    #[test]
    fn decfrac_roundtrip() {
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = enc_pad();
        add_decfrac(&buf, &mut pad, -2, 1234).unwrap();

        let mut pad = dec_pad();
        assert_eq!(pull_decfrac(&buf, &mut pad).unwrap(), (-2, 1234));
    }

    #[test]
    fn seed_binary_get_ids_values() {
        // §8.2: GET on "meas" (u8 id 2) with three f32/i16 children.
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = enc_pad();
        open_map(&buf, &mut pad, 3).unwrap();
        add_uint(&buf, &mut pad, 0x71).unwrap();
        add_f32(&buf, &mut pad, 14.1).unwrap();
        add_uint(&buf, &mut pad, 0x72).unwrap();
        add_f32(&buf, &mut pad, 5.13).unwrap();
        add_uint(&buf, &mut pad, 0x73).unwrap();
        add_int(&buf, &mut pad, 22).unwrap();
        end_container(&mut pad).unwrap();

        buf.with_payload(|p| {
            assert_eq!(p[0], 0xA3);
            assert_eq!(p[1], 0x18);
            assert_eq!(p[2], 0x71);
        });
    }
}
