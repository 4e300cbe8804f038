//! Dispatcher (C11): `process()` is the single entry point a port driver
//! calls with an inbound buffer. It owns the whole request lifecycle —
//! classify, decode, run the set engine or response builder, write the
//! reply back into the same buffer — under one acquisition of the owning
//! [`Context`]'s lock (§4.11).

use codec::{
    buffer::{Buffer, MsgType, Proto},
    command::{Classification, Verb},
    json,
    scratchpad::{CborDecode, CborEncode, JsonDecode, JsonEncode, Scratchpad},
    status::StatusCode,
};

use crate::{
    context::{Context, PHANTOM_PORT},
    decoder,
    error::Error,
    object::{Database, Oref, ROOT},
    response, set, statement,
};

/// What the caller should do with `buf` after [`process`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `buf` holds a reply (or nothing, for a dropped/forwarded message);
    /// send it back out `source_port`.
    Responded,
    /// Forward `buf` unmodified to `port_id` (a response being routed back
    /// to the peer that sent the original request, or a statement being
    /// broadcast to every other port).
    Forward { port_id: u8 },
    /// No further action — e.g. a response with no waiting peer.
    Dropped,
}

fn encode_scratchpad(proto: Proto) -> Scratchpad {
    match proto {
        Proto::Text => Scratchpad::JsonEncode(JsonEncode::default()),
        Proto::Binary | Proto::Unset => Scratchpad::CborEncode(CborEncode::default()),
    }
}

/// Reset `buf` and write `status` (plus `write_value` if given and
/// `status` is a success code) as the reply, matching `proto`'s wire
/// encoding (§4.9).
fn respond(buf: &Buffer, proto: Proto, verbose: bool, status: StatusCode, write_value: Option<&dyn Fn(&Buffer, &mut Scratchpad) -> Result<(), Error>>) {
    buf.reset();
    let text = proto == Proto::Text;
    let mut pad = encode_scratchpad(proto);
    // A status write failure here means the buffer itself is too small;
    // there is nothing more specific to report, so it is swallowed like
    // the original's best-effort reply path.
    let _ = response::write_status(buf, status, verbose, text);
    if let Some(write_value) = write_value {
        if status.is_success() {
            let _ = response::write_value_separator(buf, text);
            let _ = write_value(buf, &mut pad);
        }
    }
}

/// Run a classified request through the decoder, set engine, and response
/// builder, leaving the reply written into `buf`.
fn handle_request(buf: &Buffer, db: &Database, classification: Classification, auth: u16, verbose: bool) {
    let proto = classification.proto;

    // The decoder only needs a live scratchpad for the binary target
    // lookup (a leading CBOR uint/tstr); text targets are read straight
    // off the buffer bytes (§4.7).
    let mut decode_pad = match proto {
        Proto::Binary => Scratchpad::CborDecode(CborDecode::default()),
        Proto::Text | Proto::Unset => Scratchpad::Raw,
    };

    let decoded = match decoder::decode(buf, &mut decode_pad, db, classification) {
        Ok(d) => d,
        Err(e) => return respond(buf, proto, verbose, e.status(), None),
    };

    // Text bodies need a tokenizer pass over whatever bytes remain after
    // the path (§4.4); binary bodies keep decoding through the same CBOR
    // cursor the target lookup already advanced.
    let mut pad = match proto {
        Proto::Binary => decode_pad,
        _ => {
            let mut tokens = Vec::with_capacity(64);
            match buf.with_payload(|p| json::tokenize(p, &mut tokens)) {
                Ok(_) => Scratchpad::JsonDecode(JsonDecode { tokens, cursor: 0 }),
                Err(e) => return respond(buf, proto, verbose, StatusCode::from(e), None),
            }
        }
    };

    match decoded.verb {
        Verb::Get => {
            let target = decoded.target;
            let trailing_slash = decoded.trailing_slash;
            let binary = proto == Proto::Binary;
            if db.may_read(target, auth) {
                respond(buf, proto, verbose, StatusCode::Content, Some(&move |buf, pad| {
                    response::build_get(db, buf, pad, target, trailing_slash, auth, binary)
                }));
            } else {
                respond(buf, proto, verbose, StatusCode::Forbidden, None);
            }
        }
        Verb::Fetch => match response::resolve_fetch_keys(db, buf, &mut pad, decoded.target) {
            Ok(keys) => respond(buf, proto, verbose, StatusCode::Content, Some(&move |buf, pad| {
                response::build_fetch(db, buf, pad, &keys, auth)
            })),
            Err(e) => respond(buf, proto, verbose, e.status(), None),
        },
        Verb::Patch => match set::patch(db, buf, &mut pad, decoded.target, auth) {
            Ok(()) => respond(buf, proto, verbose, StatusCode::Changed, None),
            Err(e) => respond(buf, proto, verbose, e.status(), None),
        },
        Verb::Create => {
            let root = Oref { database_id: db.id, slot: ROOT };
            match set::subset_create(db, buf, &mut pad, decoded.target, auth, root) {
                Ok(()) => respond(buf, proto, verbose, StatusCode::Created, None),
                Err(e) => respond(buf, proto, verbose, e.status(), None),
            }
        }
        Verb::Delete => {
            let root = Oref { database_id: db.id, slot: ROOT };
            match set::subset_delete(db, buf, &mut pad, decoded.target, auth, root) {
                Ok(()) => respond(buf, proto, verbose, StatusCode::Deleted, None),
                Err(e) => respond(buf, proto, verbose, e.status(), None),
            }
        }
        Verb::Exec => match set::exec(db, buf, &mut pad, decoded.target, auth) {
            Ok(()) => respond(buf, proto, verbose, StatusCode::Valid, None),
            Err(e) => respond(buf, proto, verbose, e.status(), None),
        },
        Verb::Statement | Verb::Response => {
            respond(buf, proto, verbose, StatusCode::BadRequest, None);
        }
    }
}

/// Emit an unsolicited group or subset statement into `buf` (§4.10). Not
/// part of the request/response cycle; a port driver calls this directly
/// when a publish interval or change callback fires.
pub fn emit_statement(ctx: &Context, buf: &Buffer, pad: &mut Scratchpad, target: Oref, binary: bool) -> Result<(), Error> {
    let kind = ctx.locked();
    let db = kind.db().clone();
    drop(kind);

    buf.reset();
    let descriptor = db.descriptor(target).ok_or(Error::NotFound)?;
    match &descriptor.ty {
        crate::object::ObjectType::Subset if !binary => statement::build_subset_text(&db, buf, pad, target),
        crate::object::ObjectType::Group if !binary => statement::build_group_text(&db, buf, pad, target),
        crate::object::ObjectType::Group if binary => statement::build_group_binary(&db, buf, pad, target),
        _ => Err(Error::UnsupportedFormat),
    }
}

/// The dispatcher's single entry point (§4.11). `source_port`/`peer_uid`
/// identify where `buf` arrived from; for a core context these are
/// ignored. `now_ms` drives peer-table LRU bookkeeping.
pub fn process(ctx: &Context, buf: &Buffer, source_port: u8, peer_uid: u64, now_ms: u64) -> Outcome {
    let mut kind = ctx.locked();

    let classification = match decoder::classify(buf) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("dropping unclassifiable message from port={}: {}", source_port, e);
            let verbose = kind.verbose_status();
            drop(kind);
            respond(buf, Proto::Unset, verbose, e.status(), None);
            return Outcome::Responded;
        }
    };

    match classification.msg_type {
        MsgType::Response => {
            return match kind.peer_for_response_port(source_port) {
                Some(_) => Outcome::Forward { port_id: source_port },
                None => Outcome::Dropped,
            };
        }
        // Statements are broadcast, not answered; a com context relays
        // them to every other port rather than running them through the
        // set engine.
        MsgType::Statement => return Outcome::Forward { port_id: PHANTOM_PORT },
        MsgType::Request | MsgType::Unset => {}
    }

    let peer_idx = kind.touch_peer(source_port, peer_uid, now_ms);
    if let Some(idx) = peer_idx {
        if let Err(e) = kind.begin_request(idx) {
            log::debug!("peer port={} already has a request in flight", source_port);
            let verbose = kind.verbose_status();
            drop(kind);
            respond(buf, classification.proto, verbose, e.status(), None);
            return Outcome::Responded;
        }
    }

    let auth = kind.peer_auth(peer_idx);
    let verbose = kind.verbose_status();
    let db = kind.db().clone();

    handle_request(buf, &db, classification, auth, verbose);

    if let Some(idx) = peer_idx {
        kind.end_request(idx);
    }

    Outcome::Responded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Builder, Descriptor, ObjectType, Value, access};
    use codec::{buffer::BufferPool, cbor};
    use std::sync::Arc;

    fn meas_db() -> Arc<Database> {
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
            .build(0)
            .unwrap();
        db.set_value(db.oref_by_id(0x71).unwrap(), Value::F32(14.1));
        Arc::new(db)
    }

    #[test]
    fn binary_get_by_id_round_trips_through_dispatch() {
        let db = meas_db();
        let ctx = Context::new_core(0, db);

        let pool = BufferPool::new(2, 256);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(&[0x01]).unwrap(); // binary GET
        let mut body_pad = Scratchpad::CborEncode(CborEncode::default());
        cbor::add_uint(&buf, &mut body_pad, 0x70).unwrap();

        let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
        assert_eq!(outcome, Outcome::Responded);
        buf.with_payload(|p| assert_eq!(p[0], StatusCode::Content as u8));
    }

    #[test]
    fn text_get_group_round_trips_through_dispatch() {
        let db = meas_db();
        let ctx = Context::new_core(0, db);

        let pool = BufferPool::new(1, 128);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(b"?meas").unwrap();

        let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
        assert_eq!(outcome, Outcome::Responded);
        buf.with_payload(|p| {
            let text = std::str::from_utf8(p).unwrap();
            assert!(text.starts_with(":85"));
            assert!(text.contains("\"Bat_V\":14.10"));
        });
    }

    #[test]
    fn second_request_from_same_peer_while_in_flight_conflicts() {
        let db = meas_db();
        let ctx = Context::new_com(0, db, vec![1], 4);

        // Simulate an in-flight marker the way a slow handler would leave
        // it: touch the peer and begin a request without ending it.
        {
            let kind = ctx.locked();
            drop(kind);
            let mut kind = ctx.locked();
            let idx = kind.touch_peer(1, 42, 0).unwrap();
            kind.begin_request(idx).unwrap();
        }

        let pool = BufferPool::new(1, 64);
        let buf = pool.allocate(0, 0).unwrap();
        buf.push(b"?meas").unwrap();

        let outcome = process(&ctx, &buf, 1, 42, 1);
        assert_eq!(outcome, Outcome::Responded);
        buf.with_payload(|p| {
            let text = std::str::from_utf8(p).unwrap();
            assert!(text.starts_with(":a9"));
        });
    }
}
