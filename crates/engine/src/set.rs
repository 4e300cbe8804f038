//! Set engine (C8): validate-then-commit writes into a target group, leaf,
//! subset, or function, all-or-nothing.
//!
//! Every multi-field write runs the same two passes over the request body:
//! a validation pass that resolves keys and type-checks values without
//! touching the database, and — only if validation succeeded for every
//! element — a commit pass that writes them. Both passes share
//! [`resolve_and_visit`]; the flag distinguishing them is whether it
//! actually calls [`Database::set_value`].

use codec::{buffer::Buffer, cbor, primitive, scratchpad::Scratchpad};

use crate::{
    error::Error,
    object::{Database, Descriptor, ObjectType, Oref},
    value_codec::pull_typed,
};

enum BodyKind {
    Map,
    Array,
    Scalar,
}

fn peek_body_kind(buf: &Buffer, pad: &Scratchpad) -> Result<BodyKind, Error> {
    match pad {
        Scratchpad::JsonDecode(dec) => {
            let tok = dec.tokens.get(dec.cursor).ok_or(Error::Codec(codec::Error::Incomplete))?;
            Ok(match tok.kind {
                codec::scratchpad::JsonTokenKind::Object => BodyKind::Map,
                codec::scratchpad::JsonTokenKind::Array => BodyKind::Array,
                _ => BodyKind::Scalar,
            })
        }
        Scratchpad::CborDecode(_) => {
            let (major, _, _) = cbor::peek_head(buf).map_err(Error::Codec)?;
            Ok(match major {
                cbor::MajorType::Map => BodyKind::Map,
                cbor::MajorType::Array => BodyKind::Array,
                _ => BodyKind::Scalar,
            })
        }
        _ => Err(Error::InternalError),
    }
}

pub(crate) enum Key {
    Id(u16),
    Name(String),
}

pub(crate) fn pull_key(buf: &Buffer, pad: &mut Scratchpad) -> Result<Key, Error> {
    match pad {
        Scratchpad::JsonDecode(_) => Ok(Key::Name(primitive::pull_str(buf, pad).map_err(Error::Codec)?)),
        Scratchpad::CborDecode(_) => {
            let (major, _, _) = cbor::peek_head(buf).map_err(Error::Codec)?;
            match major {
                cbor::MajorType::Uint => Ok(Key::Id(primitive::pull_u64(buf, pad).map_err(Error::Codec)? as u16)),
                cbor::MajorType::Tstr => Ok(Key::Name(primitive::pull_str(buf, pad).map_err(Error::Codec)?)),
                _ => Err(Error::Codec(codec::Error::TypeMismatch)),
            }
        }
        _ => Err(Error::InternalError),
    }
}

fn resolve_child(db: &Database, children: &[Oref], key: &Key) -> Option<Oref> {
    children.iter().copied().find(|&child| {
        let Some(d) = db.descriptor(child) else { return false };
        match key {
            Key::Id(id) => d.id == *id,
            Key::Name(name) => &d.name == name,
        }
    })
}

/// One pass over a map body: resolve each key against `children`, enforce
/// write access, and either just type-check (`commit = false`) or write
/// the value (`commit = true`).
fn visit_map(db: &Database, buf: &Buffer, pad: &mut Scratchpad, children: &[Oref], auth: u16, commit: bool) -> Result<(), Error> {
    let n = primitive::pull_map(buf, pad).map_err(Error::Codec)?;
    for _ in 0..n {
        let key = pull_key(buf, pad)?;
        let child = resolve_child(db, children, &key).ok_or(Error::NotFound)?;
        if !db.may_write(child, auth) {
            return Err(Error::Forbidden);
        }
        let descriptor = db.descriptor(child).ok_or(Error::NotFound)?;
        let value = pull_typed(buf, pad, &descriptor.ty)?;
        if commit {
            db.set_value(child, value);
        }
    }
    primitive::end_container(buf, pad).map_err(Error::Codec)
}

fn visit_single(db: &Database, buf: &Buffer, pad: &mut Scratchpad, child: Oref, auth: u16, commit: bool) -> Result<(), Error> {
    if !db.may_write(child, auth) {
        return Err(Error::Forbidden);
    }
    let descriptor = db.descriptor(child).ok_or(Error::NotFound)?;
    let value = pull_typed(buf, pad, &descriptor.ty)?;
    if commit {
        db.set_value(child, value);
    }
    Ok(())
}

/// One pass over the body, per the layout rules in §4.8 step 1.
fn visit_body(db: &Database, buf: &Buffer, pad: &mut Scratchpad, children: &[Oref], auth: u16, commit: bool) -> Result<(), Error> {
    match children.len() {
        1 => match peek_body_kind(buf, pad)? {
            BodyKind::Map => visit_map(db, buf, pad, children, auth, commit),
            BodyKind::Array => {
                let n = primitive::pull_array(buf, pad).map_err(Error::Codec)?;
                if n != 1 {
                    return Err(Error::Codec(codec::Error::CountMismatch));
                }
                visit_single(db, buf, pad, children[0], auth, commit)?;
                primitive::end_container(buf, pad).map_err(Error::Codec)
            }
            BodyKind::Scalar => visit_single(db, buf, pad, children[0], auth, commit),
        },
        _ => visit_map(db, buf, pad, children, auth, commit),
    }
}

/// Validate then commit a body of `(key, value)` pairs into `target`'s
/// children, or — when `target` has exactly one child and the body is a
/// bare value or single-element array — into that one child directly.
fn patch_group(db: &Database, buf: &Buffer, pad: &mut Scratchpad, children: &[Oref], auth: u16) -> Result<(), Error> {
    let mark = buf.mark();
    let pad_snapshot = pad.clone();

    visit_body(db, buf, pad, children, auth, false)?;

    buf.rewind_to(mark);
    *pad = pad_snapshot;
    visit_body(db, buf, pad, children, auth, true)
}

fn patch_leaf(db: &Database, buf: &Buffer, pad: &mut Scratchpad, target: Oref, auth: u16, descriptor: &Descriptor) -> Result<(), Error> {
    if !db.may_write(target, auth) {
        return Err(Error::Forbidden);
    }
    let mark = buf.mark();
    let pad_snapshot = pad.clone();

    pull_typed(buf, pad, &descriptor.ty)?;

    buf.rewind_to(mark);
    *pad = pad_snapshot;
    let value = pull_typed(buf, pad, &descriptor.ty)?;
    db.set_value(target, value);
    Ok(())
}

/// PATCH entry point (§4.8). `target` must already have been validated by
/// the decoder as a non-root, non-function object.
pub fn patch(db: &Database, buf: &Buffer, pad: &mut Scratchpad, target: Oref, auth: u16) -> Result<(), Error> {
    let descriptor = db.descriptor(target).ok_or(Error::NotFound)?;
    match &descriptor.ty {
        ObjectType::Group => {
            let children = db.children(target);
            if children.is_empty() {
                return Err(Error::Codec(codec::Error::InvalidInput));
            }
            patch_group(db, buf, pad, &children, auth)?;
            db.invoke_group_callback(target);
            Ok(())
        }
        ObjectType::Function | ObjectType::Subset => Err(Error::MethodNotAllowed),
        _ => patch_leaf(db, buf, pad, target, auth, descriptor),
    }
}

/// EXEC entry point: `target` must be a parameterless function (§4.8).
/// The body, if present, must be an empty array.
pub fn exec(db: &Database, buf: &Buffer, pad: &mut Scratchpad, target: Oref, auth: u16) -> Result<(), Error> {
    if !db.may_write(target, auth) {
        return Err(Error::Forbidden);
    }
    if buf.len() > 0 {
        let n = primitive::pull_array(buf, pad).map_err(Error::Codec)?;
        if n != 0 {
            return Err(Error::Codec(codec::Error::CountMismatch));
        }
        primitive::end_container(buf, pad).map_err(Error::Codec)?;
    }
    db.invoke(target)
}

fn subset_mask(db: &Database, subset: Oref) -> u16 {
    db.detail(subset) as u16
}

fn subset_body_member(db: &Database, buf: &Buffer, pad: &mut Scratchpad, root: Oref) -> Result<Oref, Error> {
    let name = primitive::pull_str(buf, pad).map_err(Error::Codec)?;
    db.oref_by_path(root, &name).ok_or(Error::NotFound)
}

/// CREATE on a subset: add the named object to its membership (§3, §8.5).
pub fn subset_create(db: &Database, buf: &Buffer, pad: &mut Scratchpad, subset: Oref, auth: u16, root: Oref) -> Result<(), Error> {
    let descriptor = db.descriptor(subset).ok_or(Error::NotFound)?;
    if !matches!(descriptor.ty, ObjectType::Subset) {
        return Err(Error::MethodNotAllowed);
    }
    if !db.may_write(subset, auth) {
        return Err(Error::Forbidden);
    }
    let member = subset_body_member(db, buf, pad, root)?;
    let mask = subset_mask(db, subset);
    db.set_subsets(member, db.subsets(member) | mask);
    Ok(())
}

/// DELETE on a subset: remove the named object from its membership.
pub fn subset_delete(db: &Database, buf: &Buffer, pad: &mut Scratchpad, subset: Oref, auth: u16, root: Oref) -> Result<(), Error> {
    let descriptor = db.descriptor(subset).ok_or(Error::NotFound)?;
    if !matches!(descriptor.ty, ObjectType::Subset) {
        return Err(Error::MethodNotAllowed);
    }
    if !db.may_write(subset, auth) {
        return Err(Error::Forbidden);
    }
    let member = subset_body_member(db, buf, pad, root)?;
    let mask = subset_mask(db, subset);
    db.set_subsets(member, db.subsets(member) & !mask);
    Ok(())
}
