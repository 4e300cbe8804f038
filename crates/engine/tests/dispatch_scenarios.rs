//! End-to-end scenarios driven entirely through
//! [`thingset_engine::dispatch::process`], the way a port driver would
//! call it: push a raw request into a buffer, dispatch, read the reply
//! back out of the same buffer.

use std::sync::{atomic::{AtomicU32, Ordering}, Arc};

use codec::{
    buffer::BufferPool,
    cbor,
    scratchpad::{CborEncode, Scratchpad},
};
use thingset_engine::{
    context::{Context, PHANTOM_PORT},
    dispatch::{process, Outcome},
    object::{access, Builder, Descriptor, ObjectType, Value},
    Database,
};

fn text(buf: &codec::buffer::Buffer) -> String {
    buf.with_payload(|p| std::str::from_utf8(p).unwrap().to_owned())
}

fn reset_counter_db() -> (Arc<Database>, Arc<AtomicU32>) {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_cb = counter.clone();

    let db = Builder::new()
        .push(Descriptor {
            id: 0x80,
            name: "reset".into(),
            parent_id: 0,
            ty: ObjectType::Function,
            access_default: access::ANY,
            subsets_default: 0,
            callback: Some(Arc::new(move || {
                counter_cb.fetch_add(1, Ordering::Relaxed);
            })),
        })
        .build(0)
        .unwrap();
    (Arc::new(db), counter)
}

#[test]
fn text_exec_zero_arg_function_invokes_callback() {
    let (db, counter) = reset_counter_db();
    let ctx = Context::new_core(0, db);

    let pool = BufferPool::new(1, 64);
    let buf = pool.allocate(0, 0).unwrap();
    buf.push(b"!reset").unwrap();

    let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
    assert_eq!(outcome, Outcome::Responded);
    assert_eq!(counter.load(Ordering::Relaxed), 1);
    assert!(text(&buf).starts_with(":83")); // Valid
}

#[test]
fn binary_exec_zero_arg_function_invokes_callback() {
    let (db, counter) = reset_counter_db();
    let ctx = Context::new_core(0, db);

    let pool = BufferPool::new(1, 64);
    let buf = pool.allocate(0, 0).unwrap();
    buf.push(&[0x02]).unwrap(); // binary CREATE/EXEC code; target is a function
    let mut pad = Scratchpad::CborEncode(CborEncode::default());
    cbor::add_uint(&buf, &mut pad, 0x80).unwrap();

    let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
    assert_eq!(outcome, Outcome::Responded);
    assert_eq!(counter.load(Ordering::Relaxed), 1);
    buf.with_payload(|p| assert_eq!(p[0], 0x83)); // Valid
}

fn subset_db() -> Arc<Database> {
    let db = Builder::new()
        .push(Descriptor {
            id: 1,
            name: "report".into(),
            parent_id: 0,
            ty: ObjectType::Subset,
            access_default: access::ANY,
            subsets_default: 0,
            callback: None,
        })
        .push(Descriptor {
            id: 2,
            name: "Bat_V".into(),
            parent_id: 0,
            ty: ObjectType::F32 { precision: 2 },
            access_default: access::READ_MASK,
            subsets_default: 0,
            callback: None,
        })
        .build(0)
        .unwrap();
    db.set_detail(db.oref_by_id(1).unwrap(), 1);
    Arc::new(db)
}

#[test]
fn text_subset_create_then_delete_round_trips_membership() {
    let db = subset_db();
    let member = db.oref_by_id(2).unwrap();
    let ctx = Context::new_core(0, db.clone());

    let pool = BufferPool::new(1, 64);
    let buf = pool.allocate(0, 0).unwrap();
    buf.push(br#"+report "Bat_V""#).unwrap();
    let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
    assert_eq!(outcome, Outcome::Responded);
    assert!(text(&buf).starts_with(":81")); // Created
    assert_eq!(db.subsets(member), 1);

    let buf = pool.allocate(0, 0).unwrap();
    buf.push(br#"-report "Bat_V""#).unwrap();
    let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
    assert_eq!(outcome, Outcome::Responded);
    assert!(text(&buf).starts_with(":82")); // Deleted
    assert_eq!(db.subsets(member), 0);
}

#[test]
fn binary_get_full_round_trip_matches_text_content() {
    let db = Arc::new(
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
            .unwrap(),
    );
    db.set_value(db.oref_by_id(0x71).unwrap(), Value::F32(14.1));
    let ctx = Context::new_core(0, db);

    let pool = BufferPool::new(1, 256);
    let buf = pool.allocate(0, 0).unwrap();
    buf.push(&[0x01]).unwrap();
    let mut pad = Scratchpad::CborEncode(CborEncode::default());
    cbor::add_uint(&buf, &mut pad, 0x70).unwrap();

    let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
    assert_eq!(outcome, Outcome::Responded);
    buf.with_payload(|p| assert_eq!(p[0], 0x85));
}

#[test]
fn unknown_path_is_not_found_end_to_end() {
    let db = Arc::new(Builder::new().build(0).unwrap());
    let ctx = Context::new_core(0, db);

    let pool = BufferPool::new(1, 64);
    let buf = pool.allocate(0, 0).unwrap();
    buf.push(b"?nope").unwrap();

    let outcome = process(&ctx, &buf, PHANTOM_PORT, 0, 0);
    assert_eq!(outcome, Outcome::Responded);
    assert!(text(&buf).starts_with(":a4")); // NotFound
}
