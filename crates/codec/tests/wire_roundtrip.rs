//! Cross-module scenarios that exercise the command table, a typed
//! marshalling call, and COBS framing together the way a port driver sees
//! them: build a message, frame it for the wire, unframe it, and read it
//! back with the same typed call.

use thingset_codec::{
    buffer::BufferPool,
    cbor, cobs, command,
    command::Verb,
    json,
    scratchpad::{CborEncode, JsonDecode, JsonEncode, Scratchpad},
};

#[test]
fn binary_get_request_survives_cobs_framing() {
    let pool = BufferPool::new(1, 64);
    let buf = pool.allocate(0, 0).unwrap();

    buf.push(&[command::binary_leading_byte(Verb::Get)]).unwrap();
    let mut pad = Scratchpad::CborEncode(CborEncode::default());
    cbor::add_uint(&buf, &mut pad, 0x70).unwrap();

    let wire = buf.with_payload(|p| p.to_vec());
    let mut framed = [0u8; 16];
    let n = cobs::encode(&wire, &mut framed).unwrap();
    assert_eq!(framed[n - 1], 0x00);
    assert!(framed[..n - 1].iter().all(|&b| b != 0x00));

    let mut unframed = [0u8; 16];
    let m = cobs::decode(&framed[..n], &mut unframed).unwrap();
    assert_eq!(&unframed[..m], &wire[..]);

    let classification = command::classify_binary(unframed[0]).unwrap();
    assert_eq!(classification.verb, Verb::Get);

    let pool = BufferPool::new(1, 64);
    let buf2 = pool.allocate(0, 0).unwrap();
    buf2.push(&unframed[1..m]).unwrap();
    let mut pad = Scratchpad::CborDecode(Default::default());
    assert_eq!(cbor::pull_uint(&buf2, &mut pad).unwrap(), 0x70);
}

#[test]
fn text_and_binary_encodings_agree_on_logical_value() {
    let pool = BufferPool::new(1, 64);

    let json_buf = pool.allocate(0, 0).unwrap();
    let mut pad = Scratchpad::JsonEncode(JsonEncode::default());
    json::add_f32(&json_buf, &mut pad, 14.1, 1).unwrap();

    let cbor_buf = pool.allocate(0, 0).unwrap();
    let mut pad = Scratchpad::CborEncode(CborEncode::default());
    cbor::add_f32(&cbor_buf, &mut pad, 14.1).unwrap();

    // Different wire shapes ...
    json_buf.with_payload(|j| cbor_buf.with_payload(|c| assert_ne!(j, c)));

    // ... but the same logical value comes back out of each.
    let mut tokens = Vec::with_capacity(16);
    json_buf.with_payload(|p| json::tokenize(p, &mut tokens).unwrap());
    let mut jpad = Scratchpad::JsonDecode(JsonDecode { tokens, cursor: 0 });
    let json_value = json::pull_f32(&json_buf, &mut jpad).unwrap();

    let mut cpad = Scratchpad::CborDecode(Default::default());
    let cbor_value = cbor::pull_f32(&cbor_buf, &mut cpad).unwrap();

    assert!((json_value - cbor_value).abs() < 1e-5);
}

#[test]
fn decfrac_round_trips_through_both_encodings() {
    let pool = BufferPool::new(1, 64);

    let cbor_buf = pool.allocate(0, 0).unwrap();
    let mut pad = Scratchpad::CborEncode(CborEncode::default());
    cbor::add_decfrac(&cbor_buf, &mut pad, -2, 1234).unwrap();
    let mut pad = Scratchpad::CborDecode(Default::default());
    assert_eq!(cbor::pull_decfrac(&cbor_buf, &mut pad).unwrap(), (-2, 1234));

    let json_buf = pool.allocate(0, 0).unwrap();
    let mut pad = Scratchpad::JsonEncode(JsonEncode::default());
    json::add_decfrac(&json_buf, &mut pad, -2, 1234).unwrap();
    json_buf.with_payload(|p| assert_eq!(p, b"12.34"));
}

#[test]
fn unknown_leading_byte_is_rejected_before_any_marshalling() {
    assert!(command::classify(0x00).is_none());
    assert!(command::classify(b' ').is_none());
}
