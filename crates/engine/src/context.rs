//! Context (C12): the per-locid state the dispatcher serializes access
//! through.
//!
//! §9's REDESIGN notes ask for two things here: the original's
//! base-pointer-plus-offset trick for picking the core/com variant becomes
//! a sum type, and the original's recursive mutex becomes a single
//! external lock with non-locking internal helpers — [`Context::locked`] is
//! the only place that acquires it, and every helper in this module takes
//! `&mut ContextKind` rather than `&Context`.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::object::{Database, access};

/// No port occupies this slot.
pub const INVALID_PORT: u8 = u8::MAX;
/// Occupied by a port that exists but is not a real routable destination
/// (used for the core port of a com context, which never forwards).
pub const PHANTOM_PORT: u8 = u8::MAX - 1;

/// A remote peer a com context has exchanged at least one message with.
#[derive(Debug, Clone)]
pub struct Peer {
    pub peer_uid: u64,
    pub port_id: u8,
    pub response_port_id: u8,
    pub last_seen_ms: u64,
    pub auth: u16,
    in_flight: bool,
}

/// State for a context with a single local response buffer — no peer
/// table, no routing, used for a locid that only talks to its own stack
/// (§4.11's "core" context kind).
pub struct CoreState {
    pub db: Arc<Database>,
    pub auth: u16,
    pub verbose_status: bool,
}

/// State for a context that multiplexes several ports and remote peers
/// (§4.11's "com" context kind). `ports` lists the port ids this context
/// owns (at most 5, per §6's `PORT_COUNT` upper bound); `peers` is a
/// bounded table evicted LRU by `last_seen_ms`.
pub struct ComState {
    pub db: Arc<Database>,
    pub ports: Vec<u8>,
    pub peer_capacity: usize,
    pub peers: Vec<Peer>,
    pub verbose_status: bool,
}

impl ComState {
    /// Find a peer already known on `port_id`, or `None`.
    fn find(&self, port_id: u8, peer_uid: u64) -> Option<usize> {
        self.peers.iter().position(|p| p.port_id == port_id && p.peer_uid == peer_uid)
    }

    /// Evict the least-recently-seen entry, ties broken by lowest index
    /// (§4.11 "LRU eviction, ties broken by index").
    fn evict_lru(&mut self) -> usize {
        let victim = self
            .peers
            .iter()
            .enumerate()
            .min_by_key(|(i, p)| (p.last_seen_ms, *i))
            .map(|(i, _)| i)
            .expect("evict_lru called on an empty peer table");
        let evicted = self.peers.remove(victim);
        log::debug!("peer table full, evicting peer_uid={} port={}", evicted.peer_uid, evicted.port_id);
        victim
    }

    /// Find-or-insert a peer entry and stamp it as seen at `now_ms`,
    /// evicting the LRU entry first if the table is full.
    fn touch(&mut self, port_id: u8, peer_uid: u64, now_ms: u64) -> usize {
        if let Some(idx) = self.find(port_id, peer_uid) {
            self.peers[idx].last_seen_ms = now_ms;
            return idx;
        }
        if self.peers.len() >= self.peer_capacity {
            self.evict_lru();
        }
        self.peers.push(Peer {
            peer_uid,
            port_id,
            response_port_id: PHANTOM_PORT,
            last_seen_ms: now_ms,
            auth: access::ANY,
            in_flight: false,
        });
        self.peers.len() - 1
    }

    /// Mark a peer's request as in flight, or report the conflict if one
    /// already is (§4.11's "at most one in-flight request per peer").
    fn begin_request(&mut self, idx: usize) -> Result<(), crate::error::Error> {
        if self.peers[idx].in_flight {
            return Err(crate::error::Error::Conflict);
        }
        self.peers[idx].in_flight = true;
        Ok(())
    }

    fn end_request(&mut self, idx: usize) {
        self.peers[idx].in_flight = false;
    }

    fn by_response_port(&self, response_port_id: u8) -> Option<&Peer> {
        self.peers.iter().find(|p| p.response_port_id == response_port_id)
    }
}

pub enum ContextKind {
    Core(CoreState),
    Com(ComState),
}

/// A locid's serialized state. `process()` in [`crate::dispatch`] is the
/// only caller that locks it.
pub struct Context {
    pub locid: u8,
    state: Mutex<ContextKind>,
}

impl Context {
    pub fn new_core(locid: u8, db: Arc<Database>) -> Self {
        Self { locid, state: Mutex::new(ContextKind::Core(CoreState { db, auth: access::ANY, verbose_status: true })) }
    }

    pub fn new_com(locid: u8, db: Arc<Database>, ports: Vec<u8>, peer_capacity: usize) -> Self {
        Self {
            locid,
            state: Mutex::new(ContextKind::Com(ComState {
                db,
                ports,
                peer_capacity,
                peers: Vec::with_capacity(peer_capacity),
                verbose_status: true,
            })),
        }
    }

    /// The single lock acquisition point. Everything the dispatcher needs
    /// to do under the lock happens inside `f`.
    pub(crate) fn locked(&self) -> MutexGuard<'_, ContextKind> {
        self.state.lock()
    }
}

impl ContextKind {
    pub fn db(&self) -> &Arc<Database> {
        match self {
            ContextKind::Core(c) => &c.db,
            ContextKind::Com(c) => &c.db,
        }
    }

    pub(crate) fn touch_peer(&mut self, port_id: u8, peer_uid: u64, now_ms: u64) -> Option<usize> {
        match self {
            ContextKind::Core(_) => None,
            ContextKind::Com(c) => Some(c.touch(port_id, peer_uid, now_ms)),
        }
    }

    pub(crate) fn begin_request(&mut self, idx: usize) -> Result<(), crate::error::Error> {
        match self {
            ContextKind::Core(_) => Ok(()),
            ContextKind::Com(c) => c.begin_request(idx),
        }
    }

    pub(crate) fn end_request(&mut self, idx: usize) {
        if let ContextKind::Com(c) = self {
            c.end_request(idx);
        }
    }

    pub(crate) fn peer_auth(&self, idx: Option<usize>) -> u16 {
        match (self, idx) {
            (ContextKind::Core(c), _) => c.auth,
            (ContextKind::Com(c), Some(idx)) => c.peers[idx].auth,
            (ContextKind::Com(_), None) => access::ANY,
        }
    }

    pub(crate) fn peer_for_response_port(&self, response_port_id: u8) -> Option<u64> {
        match self {
            ContextKind::Core(_) => None,
            ContextKind::Com(c) => c.by_response_port(response_port_id).map(|p| p.peer_uid),
        }
    }

    pub(crate) fn verbose_status(&self) -> bool {
        match self {
            ContextKind::Core(c) => c.verbose_status,
            ContextKind::Com(c) => c.verbose_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Builder;

    fn empty_db() -> Arc<Database> {
        Arc::new(Builder::new().build(0).unwrap())
    }

    #[test]
    fn peer_table_evicts_least_recently_seen() {
        let mut com = ComState { db: empty_db(), ports: vec![1], peer_capacity: 2, peers: Vec::new(), verbose_status: true };
        com.touch(1, 100, 10);
        com.touch(1, 200, 20);
        // Table full; inserting a third peer should evict uid 100 (lowest last_seen_ms).
        com.touch(1, 300, 30);
        assert!(com.find(1, 100).is_none());
        assert!(com.find(1, 200).is_some());
        assert!(com.find(1, 300).is_some());
    }

    #[test]
    fn second_request_while_in_flight_is_conflict() {
        let mut com = ComState { db: empty_db(), ports: vec![1], peer_capacity: 4, peers: Vec::new(), verbose_status: true };
        let idx = com.touch(1, 42, 0);
        com.begin_request(idx).unwrap();
        assert_eq!(com.begin_request(idx), Err(crate::error::Error::Conflict));
        com.end_request(idx);
        assert!(com.begin_request(idx).is_ok());
    }
}
