//! Port-lifecycle and dispatch observer, wired to `log` by default.
//!
//! [`thingset_engine::dispatch`] already logs the things it alone knows
//! about (classification failures, peer eviction, in-flight conflicts).
//! This trait sits one layer up, at the port driver, where "a peer
//! connected" and "a request came in and went out again" are visible.

use engine::dispatch::Outcome;

/// Hook points a port driver calls into as connections come and go and
/// messages are dispatched. Every method has a logging default; override
/// only the ones a particular deployment needs to act on.
pub trait EngineHandler: Send + Sync {
    fn port_opened(&self, port_id: u8, peer: &str) {
        log::info!("port open: port={} peer={}", port_id, peer);
    }

    fn port_closed(&self, port_id: u8, peer: &str) {
        log::info!("port closed: port={} peer={}", port_id, peer);
    }

    /// One call per dispatched message — logged at `debug`, since a busy
    /// port emits far more of these than the other two hooks combined.
    fn dispatched(&self, port_id: u8, peer_uid: u64, outcome: Outcome) {
        log::debug!("dispatch: port={} peer_uid={} outcome={:?}", port_id, peer_uid, outcome);
    }
}

/// The default handler: every hook just logs.
pub struct LoggingHandler;

impl EngineHandler for LoggingHandler {}
