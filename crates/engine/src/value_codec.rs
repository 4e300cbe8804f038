//! Bridges [`Value`]/[`ObjectType`] to the codec crate's typed
//! `add_T`/`pull_T` calls. Shared by the set engine (C8, decoding a
//! request body against a target's type) and the response builder (C9,
//! encoding a stored value back out).

use codec::{buffer::Buffer, primitive, scratchpad::Scratchpad};

use crate::{
    error::Error,
    object::{ArrayElement, DEFAULT_F32_PRECISION, ObjectType, Value},
};

pub fn pull_typed(buf: &Buffer, pad: &mut Scratchpad, ty: &ObjectType) -> Result<Value, Error> {
    Ok(match ty {
        ObjectType::Bool => Value::Bool(primitive::pull_bool(buf, pad)?),
        ObjectType::U8 => Value::U8(primitive::pull_u8(buf, pad)?),
        ObjectType::I8 => Value::I8(primitive::pull_i8(buf, pad)?),
        ObjectType::U16 => Value::U16(primitive::pull_u16(buf, pad)?),
        ObjectType::I16 => Value::I16(primitive::pull_i16(buf, pad)?),
        ObjectType::U32 => Value::U32(primitive::pull_u32(buf, pad)?),
        ObjectType::I32 => Value::I32(primitive::pull_i32(buf, pad)?),
        ObjectType::U64 => Value::U64(primitive::pull_u64(buf, pad)?),
        ObjectType::I64 => Value::I64(primitive::pull_i64(buf, pad)?),
        ObjectType::F32 { .. } => Value::F32(primitive::pull_f32(buf, pad)?),
        ObjectType::Decfrac { exponent } => {
            let (_, mantissa) = primitive::pull_decfrac(buf, pad)?;
            Value::Decfrac { exponent: *exponent, mantissa }
        }
        ObjectType::String { capacity } => {
            let s = primitive::pull_str(buf, pad)?;
            if s.len() > *capacity as usize {
                return Err(Error::Codec(codec::Error::TooLarge));
            }
            Value::String(s)
        }
        ObjectType::Bytes { capacity } => {
            let b = primitive::pull_bytes(buf, pad)?;
            if b.len() > *capacity as usize {
                return Err(Error::Codec(codec::Error::TooLarge));
            }
            Value::Bytes(b)
        }
        ObjectType::Array { element, capacity } => {
            let n = primitive::pull_array(buf, pad)?;
            if n > *capacity as u32 {
                return Err(Error::Codec(codec::Error::TooLarge));
            }
            let mut items = Vec::with_capacity(n as usize);
            for _ in 0..n {
                items.push(pull_array_element(buf, pad, *element)?);
            }
            primitive::end_container(buf, pad)?;
            Value::Array(items)
        }
        ObjectType::Group | ObjectType::Function | ObjectType::Subset => {
            return Err(Error::Codec(codec::Error::TypeMismatch));
        }
    })
}

fn pull_array_element(buf: &Buffer, pad: &mut Scratchpad, element: ArrayElement) -> Result<Value, Error> {
    Ok(match element {
        ArrayElement::U8 => Value::U8(primitive::pull_u8(buf, pad)?),
        ArrayElement::I8 => Value::I8(primitive::pull_i8(buf, pad)?),
        ArrayElement::U16 => Value::U16(primitive::pull_u16(buf, pad)?),
        ArrayElement::I16 => Value::I16(primitive::pull_i16(buf, pad)?),
        ArrayElement::U32 => Value::U32(primitive::pull_u32(buf, pad)?),
        ArrayElement::I32 => Value::I32(primitive::pull_i32(buf, pad)?),
        ArrayElement::U64 => Value::U64(primitive::pull_u64(buf, pad)?),
        ArrayElement::I64 => Value::I64(primitive::pull_i64(buf, pad)?),
        ArrayElement::F32 => Value::F32(primitive::pull_f32(buf, pad)?),
    })
}

/// `ty` supplies the float precision `Value::F32` renders with; everything
/// else about the value is self-describing.
pub fn add_typed(buf: &Buffer, pad: &mut Scratchpad, value: &Value, ty: &ObjectType) -> Result<(), Error> {
    match value {
        Value::Bool(v) => primitive::add_bool(buf, pad, *v)?,
        Value::U8(v) => primitive::add_u8(buf, pad, *v)?,
        Value::I8(v) => primitive::add_i8(buf, pad, *v)?,
        Value::U16(v) => primitive::add_u16(buf, pad, *v)?,
        Value::I16(v) => primitive::add_i16(buf, pad, *v)?,
        Value::U32(v) => primitive::add_u32(buf, pad, *v)?,
        Value::I32(v) => primitive::add_i32(buf, pad, *v)?,
        Value::U64(v) => primitive::add_u64(buf, pad, *v)?,
        Value::I64(v) => primitive::add_i64(buf, pad, *v)?,
        Value::F32(v) => {
            let precision = match ty {
                ObjectType::F32 { precision } => *precision,
                _ => DEFAULT_F32_PRECISION,
            };
            primitive::add_f32(buf, pad, *v, precision)?
        }
        Value::Decfrac { exponent, mantissa } => primitive::add_decfrac(buf, pad, *exponent, *mantissa)?,
        Value::String(s) => primitive::add_str(buf, pad, s)?,
        Value::Bytes(b) => primitive::add_bytes(buf, pad, b)?,
        Value::Array(items) => {
            primitive::open_array(buf, pad, items.len() as u32)?;
            for item in items {
                // Array elements carry no per-slot precision (`ArrayElement`
                // has no float-precision field); fall back to the default.
                add_typed(buf, pad, item, &ObjectType::F32 { precision: DEFAULT_F32_PRECISION })?;
            }
            primitive::end_array(buf, pad)?;
        }
        Value::Unit => primitive::add_null(buf, pad)?,
    }
    Ok(())
}
