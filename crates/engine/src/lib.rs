//! Object database, request pipeline, and dispatcher built on top of
//! [`thingset_codec`]. The codec crate knows nothing about objects,
//! access control, or routing; this crate is where a wire message turns
//! into a database read or write and back into a wire message.

pub mod context;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod object;
pub mod response;
pub mod set;
pub mod statement;
pub mod value_codec;

pub use error::Error;
pub use object::{Database, Oref};
