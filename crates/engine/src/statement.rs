//! Statement builder (C10): unsolicited group and subset snapshots.
//!
//! Statements carry no status and expect no response — the dispatcher
//! sends them without the request/response pairing machinery in §4.11.

use codec::{buffer::Buffer, primitive, scratchpad::Scratchpad};

use crate::{
    error::Error,
    object::{Database, Oref},
    value_codec::add_typed,
};

/// Text: `#<name> {k1: v1, ...}` over a group's direct children (§4.10).
pub fn build_group_text(db: &Database, buf: &Buffer, pad: &mut Scratchpad, group: Oref) -> Result<(), Error> {
    let descriptor = db.descriptor(group).ok_or(Error::NotFound)?;
    buf.push(b"#")?;
    buf.push(descriptor.name.as_bytes())?;
    buf.push(b" ")?;

    let children = db.children(group);
    primitive::open_map(buf, pad, children.len() as u32)?;
    for child in &children {
        let child_descriptor = db.descriptor(*child).ok_or(Error::InternalError)?;
        primitive::add_map_key(buf, pad, &child_descriptor.name)?;
        let value = db.value(*child).ok_or(Error::InternalError)?;
        add_typed(buf, pad, &value, &child_descriptor.ty)?;
    }
    primitive::end_map(buf, pad)
}

/// Binary: `0x1F <id> [v1, ...]` over a group's direct children, in
/// database order (§4.10, §6).
pub fn build_group_binary(db: &Database, buf: &Buffer, pad: &mut Scratchpad, group: Oref) -> Result<(), Error> {
    let descriptor = db.descriptor(group).ok_or(Error::NotFound)?;
    buf.push(&[0x1F])?;
    primitive::add_u64(buf, pad, descriptor.id as u64)?;

    let children = db.children(group);
    primitive::open_array(buf, pad, children.len() as u32)?;
    for child in &children {
        let child_descriptor = db.descriptor(*child).ok_or(Error::InternalError)?;
        let value = db.value(*child).ok_or(Error::InternalError)?;
        add_typed(buf, pad, &value, &child_descriptor.ty)?;
    }
    primitive::end_array(buf, pad)
}

/// Text: `#<subset-name> [member1, ...]`, the members' names in database
/// order (§4.10, §6).
pub fn build_subset_text(db: &Database, buf: &Buffer, pad: &mut Scratchpad, subset: Oref) -> Result<(), Error> {
    let descriptor = db.descriptor(subset).ok_or(Error::NotFound)?;
    buf.push(b"#")?;
    buf.push(descriptor.name.as_bytes())?;
    buf.push(b" ")?;

    let mask = db.detail(subset) as u16;
    let members = db.members_of_subset(mask);
    primitive::open_array(buf, pad, members.len() as u32)?;
    for member in &members {
        let name = &db.descriptor(*member).ok_or(Error::InternalError)?.name;
        primitive::add_str(buf, pad, name)?;
    }
    primitive::end_array(buf, pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Builder, Descriptor, ObjectType, Value, access};
    use codec::{buffer::BufferPool, scratchpad::JsonEncode};

    #[test]
    fn group_statement_lists_children_in_order() {
        let db = Builder::new()
            .push(Descriptor {
                id: 1,
                name: "meas".into(),
                parent_id: 0,
                ty: ObjectType::Group,
                access_default: access::ANY,
                subsets_default: 0,
                callback: None,
            })
            .push(Descriptor {
                id: 2,
                name: "Bat_V".into(),
                parent_id: 1,
                ty: ObjectType::F32 { precision: 2 },
                access_default: access::READ_MASK,
                subsets_default: 0,
                callback: None,
            })
            .build(0)
            .unwrap();
        db.set_value(db.oref_by_id(2).unwrap(), Value::F32(14.1));

        let pool = BufferPool::new(1, 128);
        let buf = pool.allocate(0, 0).unwrap();
        let mut pad = Scratchpad::JsonEncode(JsonEncode::default());
        build_group_text(&db, &buf, &mut pad, db.oref_by_id(1).unwrap()).unwrap();

        buf.with_payload(|p| {
            assert_eq!(std::str::from_utf8(p).unwrap(), r#"#meas {"Bat_V":14.10}"#);
        });
    }
}
