//! Response builder (C9): GET/FETCH value serialization and the status
//! response every request ultimately produces.

use codec::{
    primitive,
    scratchpad::Scratchpad,
    status::StatusCode,
    buffer::Buffer,
};

use crate::{
    error::Error,
    object::{Database, ObjectType, Oref},
    set::Key,
    value_codec::add_typed,
};

/// Write the status prefix. Text: `:<hh>[ <description>.]`; binary: the
/// single status byte. The caller appends any value afterwards.
pub fn write_status(buf: &Buffer, status: StatusCode, verbose: bool, text: bool) -> Result<(), Error> {
    if text {
        buf.push(b":")?;
        buf.push(format!("{:02x}", status as u8).as_bytes())?;
        if verbose {
            buf.push(b" ")?;
            buf.push(status.description().as_bytes())?;
            buf.push(b".")?;
        }
    } else {
        buf.push(&[status as u8])?;
    }
    Ok(())
}

pub fn write_value_separator(buf: &Buffer, text: bool) -> Result<(), Error> {
    if text { buf.push(b" ") } else { Ok(()) }
}

/// Render one object's current value per the FETCH typing rules (§4.9):
/// scalars render as themselves, `exec` as its parameter-name array (empty
/// — parameterless functions are the only kind this engine models),
/// `subset` as member names intersecting its bitmask, `array` as the
/// current element prefix.
fn render_value(db: &Database, buf: &Buffer, pad: &mut Scratchpad, oref: Oref) -> Result<(), Error> {
    let descriptor = db.descriptor(oref).ok_or(Error::NotFound)?;
    match &descriptor.ty {
        ObjectType::Function => {
            primitive::open_array(buf, pad, 0)?;
            primitive::end_array(buf, pad)?;
            Ok(())
        }
        ObjectType::Subset => {
            let mask = db.detail(oref) as u16;
            let members = db.members_of_subset(mask);
            primitive::open_array(buf, pad, members.len() as u32)?;
            for member in &members {
                let name = &db.descriptor(*member).ok_or(Error::InternalError)?.name;
                primitive::add_str(buf, pad, name)?;
            }
            primitive::end_array(buf, pad)?;
            Ok(())
        }
        ObjectType::Group => Err(Error::UnsupportedFormat),
        _ => {
            let value = db.value(oref).ok_or(Error::InternalError)?;
            add_typed(buf, pad, &value, &descriptor.ty)
        }
    }
}

/// GET response body (§4.9). Chooses among the four variants by object
/// type and `trailing_slash`; `binary` selects "ids+values" over
/// "names+values" for a group without a trailing slash.
pub fn build_get(db: &Database, buf: &Buffer, pad: &mut Scratchpad, target: Oref, trailing_slash: bool, auth: u16, binary: bool) -> Result<(), Error> {
    if !db.may_read(target, auth) {
        return Err(Error::Forbidden);
    }

    let is_group = target.is_root() || db.descriptor(target).map(|d| matches!(d.ty, ObjectType::Group)).unwrap_or(false);

    if is_group {
        let children = db.children(target);
        if trailing_slash {
            primitive::open_array(buf, pad, children.len() as u32)?;
            for child in &children {
                let name = &db.descriptor(*child).ok_or(Error::InternalError)?.name;
                primitive::add_str(buf, pad, name)?;
            }
            primitive::end_array(buf, pad)
        } else {
            primitive::open_map(buf, pad, children.len() as u32)?;
            for child in &children {
                let descriptor = db.descriptor(*child).ok_or(Error::InternalError)?;
                if binary {
                    primitive::add_u64(buf, pad, descriptor.id as u64)?;
                } else {
                    primitive::add_map_key(buf, pad, &descriptor.name)?;
                }
                render_value(db, buf, pad, *child)?;
            }
            primitive::end_map(buf, pad)
        }
    } else if matches!(db.descriptor(target).map(|d| &d.ty), Some(ObjectType::Subset)) {
        render_value(db, buf, pad, target)
    } else {
        render_value(db, buf, pad, target)
    }
}

/// Resolve each key in a FETCH body against `target`'s children (or, for
/// the root, its top-level objects), returning the orefs in request order
/// so the reply can answer "array of values in the same order" (§4.9).
pub fn resolve_fetch_keys(db: &Database, buf: &Buffer, pad: &mut Scratchpad, target: Oref) -> Result<Vec<Oref>, Error> {
    let children = db.children(target);
    let n = primitive::pull_array(buf, pad).map_err(Error::Codec)?;
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let key = crate::set::pull_key(buf, pad)?;
        let child = children
            .iter()
            .copied()
            .find(|&c| match &key {
                Key::Id(id) => db.descriptor(c).map(|d| d.id == *id).unwrap_or(false),
                Key::Name(name) => db.descriptor(c).map(|d| &d.name == name).unwrap_or(false),
            })
            .ok_or(Error::NotFound)?;
        out.push(child);
    }
    primitive::end_container(buf, pad).map_err(Error::Codec)?;
    Ok(out)
}

/// Write a FETCH response body: values for `keys`, in order, as an array.
pub fn build_fetch(db: &Database, buf: &Buffer, pad: &mut Scratchpad, keys: &[Oref], auth: u16) -> Result<(), Error> {
    for &key in keys {
        if !db.may_read(key, auth) {
            return Err(Error::Forbidden);
        }
    }
    primitive::open_array(buf, pad, keys.len() as u32)?;
    for &key in keys {
        render_value(db, buf, pad, key)?;
    }
    primitive::end_array(buf, pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Builder, Descriptor, Value, access};
    use codec::{buffer::BufferPool, scratchpad::JsonEncode};

    fn meas_db() -> Database {
        let db = Builder::new()
            .push(Descriptor {
                id: 0x70,
                name: "meas".into(),
                parent_id: 0,
                ty: ObjectType::Group,
                access_default: access::ANY,
                subsets_default: 0,
                callback: None,
            })
            .push(Descriptor {
                id: 0x71,
                name: "Bat_V".into(),
                parent_id: 0x70,
                ty: ObjectType::F32 { precision: 2 },
                access_default: access::READ_MASK,
                subsets_default: 0,
                callback: None,
            })
            .push(Descriptor {
                id: 0x72,
                name: "Bat_A".into(),
                parent_id: 0x70,
                ty: ObjectType::F32 { precision: 2 },
                access_default: access::READ_MASK,
                subsets_default: 0,
                callback: None,
            })
            .push(Descriptor {
                id: 0x73,
                name: "Ambient_degC".into(),
                parent_id: 0x70,
                ty: ObjectType::I16,
                access_default: access::READ_MASK,
                subsets_default: 0,
                callback: None,
            })
            .build(0)
            .unwrap();
        db.set_value(db.oref_by_id(0x71).unwrap(), Value::F32(14.1));
        db.set_value(db.oref_by_id(0x72).unwrap(), Value::F32(5.13));
        db.set_value(db.oref_by_id(0x73).unwrap(), Value::I16(22));
        db
    }

    #[test]
    fn seed_text_get_group() {
        let db = meas_db();
        let meas = db.oref_by_id(0x70).unwrap();
        let pool = BufferPool::new(1, 256);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = Scratchpad::JsonEncode(JsonEncode::default());

        write_status(&buf, StatusCode::Content, true, true).unwrap();
        write_value_separator(&buf, true).unwrap();
        build_get(&db, &buf, &mut pad, meas, false, access::USER_READ, false).unwrap();

        buf.with_payload(|p| {
            assert_eq!(
                std::str::from_utf8(p).unwrap(),
                r#":85 Content. {"Bat_V":14.10,"Bat_A":5.13,"Ambient_degC":22}"#
            );
        });
    }

    #[test]
    fn unreadable_target_is_forbidden() {
        let db = meas_db();
        let bat_v = db.oref_by_id(0x71).unwrap();
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = Scratchpad::JsonEncode(JsonEncode::default());
        assert_eq!(build_get(&db, &buf, &mut pad, bat_v, false, 0, false), Err(Error::Forbidden));
    }
}
