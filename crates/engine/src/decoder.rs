//! Request decoder (C7).
//!
//! Classifies the leading command octet (delegating the table itself to
//! [`codec::command`]), resolves the target endpoint against a
//! [`Database`], and determines whether the request is well-formed enough
//! to hand to the set engine or response builder. Failure to resolve sets
//! the message to `VALID_ERROR` with `NOT_FOUND` or `BAD_REQUEST` per
//! §4.7 — modeled here as an `Err` the dispatcher turns into a status
//! response rather than a silent bit flip on the message.

use codec::{
    buffer::{Buffer, MsgType, Proto},
    cbor, command,
    command::Verb,
    primitive,
    scratchpad::Scratchpad,
};

use crate::{
    error::Error,
    object::{Database, ObjectType, Oref, ROOT},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedRequest {
    pub proto: Proto,
    pub verb: Verb,
    pub target: Oref,
    /// `true` when the text path ended in `/`, or — for symmetry — when a
    /// binary request carried no further qualifier; used by the response
    /// builder to choose between the "names" and "names+values" GET
    /// variants (§4.9).
    pub trailing_slash: bool,
}

/// Consume the leading command octet and classify the message.
pub fn classify(buf: &Buffer) -> Result<command::Classification, Error> {
    let leading = buf.with_payload(|p| p.first().copied());
    let leading = leading.ok_or(Error::Codec(codec::Error::Incomplete))?;
    let classification = command::classify(leading).ok_or(Error::Codec(codec::Error::InvalidInput))?;
    buf.remove_front(1)?;
    Ok(classification)
}

/// Read a text path token: letters, digits, `._-/` (§4.7). Returns the
/// token text and whether it ended in `/`.
fn read_text_path(buf: &Buffer) -> (String, bool) {
    let token = buf.with_payload(|p| {
        let end = p
            .iter()
            .position(|&b| !(b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-' | b'/')))
            .unwrap_or(p.len());
        String::from_utf8_lossy(&p[..end]).into_owned()
    });
    let trailing_slash = token.ends_with('/');
    buf.remove_front(token.len()).ok();
    (token, trailing_slash)
}

fn skip_space(buf: &Buffer) {
    let has_space = buf.with_payload(|p| p.first() == Some(&b' '));
    if has_space {
        let _ = buf.remove_front(1);
    }
}

fn has_body(buf: &Buffer) -> bool {
    buf.with_payload(|p| !p.is_empty())
}

/// Decode the target endpoint and validate it against `verb`.
pub fn decode(
    buf: &Buffer,
    pad: &mut Scratchpad,
    db: &Database,
    classification: command::Classification,
) -> Result<DecodedRequest, Error> {
    let root = Oref { database_id: db.id, slot: ROOT };

    let (target, trailing_slash) = match classification.proto {
        Proto::Text => {
            let (path, trailing_slash) = read_text_path(buf);
            skip_space(buf);
            let target = if path.is_empty() { root } else { db.oref_by_path(root, &path).ok_or(Error::NotFound)? };
            (target, trailing_slash)
        }
        Proto::Binary => {
            if !has_body(buf) {
                (root, false)
            } else {
                let (major, _, _) = cbor::peek_head(buf).map_err(Error::Codec)?;
                let target = match major {
                    cbor::MajorType::Uint => {
                        let id = primitive::pull_u64(buf, pad).map_err(Error::Codec)? as u16;
                        db.oref_by_id(id).ok_or(Error::NotFound)?
                    }
                    cbor::MajorType::Tstr => {
                        let name = primitive::pull_str(buf, pad).map_err(Error::Codec)?;
                        db.oref_by_name(root, &name).ok_or(Error::NotFound)?
                    }
                    _ => root,
                };
                (target, false)
            }
        }
    };

    let mut verb = classification.verb;
    if verb == Verb::Get && has_body(buf) {
        verb = Verb::Fetch;
    }
    // Binary has one message code (0x02) for both CREATE and EXEC; the
    // original distinguishes them by the target's object type rather than
    // a second leading byte (a function target means EXEC, anything else
    // — a subset — means CREATE). `command::classify_binary` picks
    // `Create` as the default; flip it once the target is known.
    if classification.proto == Proto::Binary
        && verb == Verb::Create
        && matches!(db.descriptor(target).map(|d| &d.ty), Some(ObjectType::Function))
    {
        verb = Verb::Exec;
    }

    match verb {
        Verb::Exec => {
            if target.is_root() || !matches!(db.descriptor(target).map(|d| &d.ty), Some(ObjectType::Function)) {
                return Err(Error::MethodNotAllowed);
            }
        }
        Verb::Patch => {
            if target.is_root() {
                return Err(Error::MethodNotAllowed);
            }
        }
        _ => {}
    }

    Ok(DecodedRequest { proto: classification.proto, verb, target, trailing_slash })
}

/// `true` for the message types the decoder handles as requests; C11 uses
/// this to decide whether to route to C7/C8/C9 at all.
pub fn is_request(msg_type: MsgType) -> bool {
    msg_type == MsgType::Request
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Builder, Descriptor, access};
    use codec::buffer::BufferPool;

    fn sample_db() -> Database {
        Builder::new()
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
            .build(0)
            .unwrap()
    }

    #[test]
    fn text_get_resolves_group() {
        let db = sample_db();
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(b"?meas").unwrap();

        let classification = classify(&buf).unwrap();
        let mut pad = Scratchpad::Raw;
        let decoded = decode(&buf, &mut pad, &db, classification).unwrap();
        assert_eq!(decoded.verb, Verb::Get);
        assert_eq!(db.descriptor(decoded.target).unwrap().id, 0x70);
    }

    #[test]
    fn get_with_body_upgrades_to_fetch() {
        let db = sample_db();
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(b"?meas [\"Bat_V\"]").unwrap();

        let classification = classify(&buf).unwrap();
        let mut pad = Scratchpad::Raw;
        let decoded = decode(&buf, &mut pad, &db, classification).unwrap();
        assert_eq!(decoded.verb, Verb::Fetch);
    }

    #[test]
    fn unresolvable_path_is_not_found() {
        let db = sample_db();
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(b"?nope").unwrap();

        let classification = classify(&buf).unwrap();
        let mut pad = Scratchpad::Raw;
        assert_eq!(decode(&buf, &mut pad, &db, classification), Err(Error::NotFound));
    }

    #[test]
    fn patch_on_root_is_method_not_allowed() {
        let db = sample_db();
        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(b"=").unwrap();

        let classification = classify(&buf).unwrap();
        let mut pad = Scratchpad::Raw;
        assert_eq!(decode(&buf, &mut pad, &db, classification), Err(Error::MethodNotAllowed));
    }
}
