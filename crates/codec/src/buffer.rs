//! Pooled byte buffer (C1).
//!
//! A [`Buffer`] is a cheaply-shareable handle onto a pool-owned byte
//! region carrying a message as it moves through the engine. The region is
//! split into headroom / data / tailroom, exactly as a network stack
//! buffer would be: `head <= data <= tail <= capacity`. `data` is where the
//! payload the caller is interested in right now starts; `head` and `tail`
//! bound the room available to grow the payload backwards (push a header)
//! or forwards (append a trailer) without copying.
//!
//! Reference counting (the original C API's `ref`/`unref` pair) is modeled
//! as an `Arc` handle: [`Buffer::share`] is the cheap "ref" a fan-out needs,
//! and the last handle's drop is the "unref" that returns the storage to
//! the pool. The original `clone` operation — a deep copy of the payload
//! plus the standard scratchroom — is kept as an explicit, separately
//! named method ([`Buffer::duplicate`]) so it is never confused with the
//! cheap share.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex};

use crate::{Error, TimeoutMs};

/// Message validity, matching the original's `ts_msg_valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Valid {
    #[default]
    Unset,
    Ok,
    Error,
}

/// Wire protocol the message was or will be carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Proto {
    #[default]
    Unset,
    Binary,
    Text,
}

/// Request, response, or statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsgType {
    #[default]
    Unset,
    Request,
    Response,
    Statement,
}

/// Framing applied (or to be applied) at the port boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    None,
    Cobs,
    Can,
}

/// The standard scratchroom: status fields present on every message
/// regardless of which [`crate::scratchpad::Scratchpad`] variant occupies
/// its extension scratchroom.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdScratchroom {
    pub valid: Valid,
    pub proto: Proto,
    pub msg_type: MsgType,
    pub encoding: Encoding,
    /// Status / method code (the byte classified in §4.7, or a status code
    /// once one has been assigned).
    pub code: u8,
    /// Authorization mask captured from the owning context at dispatch
    /// time (§4.11 step 3).
    pub auth: u16,
}

struct BufferData {
    bytes: BytesMut,
    head: usize,
    data: usize,
    tail: usize,
    std: StdScratchroom,
}

impl BufferData {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

struct PoolState {
    available: usize,
}

/// A bounded pool of fixed-size buffers. `BUF_COUNT` / `BUF_DATA_SIZE` from
/// §6 are this pool's `count` and `data_size`.
pub struct BufferPool {
    state: Mutex<PoolState>,
    not_empty: Condvar,
    data_size: usize,
}

impl BufferPool {
    pub fn new(count: usize, data_size: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PoolState { available: count }),
            not_empty: Condvar::new(),
            data_size,
        })
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Allocate a buffer sized to hold at least `payload_size` bytes,
    /// waiting up to `timeout_ms` for a free slot.
    ///
    /// # Test
    ///
    /// ```
    /// use thingset_codec::buffer::BufferPool;
    ///
    /// let pool = BufferPool::new(1, 256);
    /// let a = pool.allocate(16, 0).unwrap();
    /// assert!(pool.allocate(16, 0).is_err());
    /// drop(a);
    /// assert!(pool.allocate(16, 0).is_ok());
    /// ```
    pub fn allocate(self: &Arc<Self>, payload_size: usize, timeout_ms: TimeoutMs) -> Result<Buffer, Error> {
        if payload_size > self.data_size {
            return Err(Error::TooLarge);
        }

        let mut state = self.state.lock();
        if state.available == 0 {
            if timeout_ms == crate::IMMEDIATE {
                return Err(Error::OutOfMemory);
            }

            let deadline = if timeout_ms == crate::FOREVER {
                None
            } else {
                Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
            };

            while state.available == 0 {
                let timed_out = match deadline {
                    Some(d) => {
                        let now = Instant::now();
                        if now >= d {
                            true
                        } else {
                            self.not_empty.wait_for(&mut state, d - now).timed_out()
                        }
                    }
                    None => {
                        self.not_empty.wait(&mut state);
                        false
                    }
                };

                if timed_out && state.available == 0 {
                    return Err(Error::OutOfMemory);
                }
            }
        }

        state.available -= 1;
        drop(state);

        Ok(Buffer {
            pool: self.clone(),
            inner: Arc::new(Mutex::new(BufferData {
                bytes: BytesMut::zeroed(self.data_size),
                head: 0,
                data: 0,
                tail: 0,
                std: StdScratchroom::default(),
            })),
        })
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.available += 1;
        drop(state);
        self.not_empty.notify_one();
    }
}

/// A pooled, reference-counted message buffer.
///
/// `Buffer::clone` (the standard trait) is the cheap "ref" — an `Arc` bump
/// sharing the same storage, used for fan-out to multiple ports.
/// [`Buffer::duplicate`] is the original's `clone` operation, an explicit
/// deep copy used when a caller genuinely needs an independent buffer (for
/// example, to retain a snapshot while the original buffer keeps being
/// mutated by the pipeline).
#[derive(Clone)]
pub struct Buffer {
    pool: Arc<BufferPool>,
    inner: Arc<Mutex<BufferData>>,
}

impl Buffer {
    /// Cheap shared handle onto the same storage (the original's `ref`).
    pub fn share(&self) -> Self {
        self.clone()
    }

    /// Deep copy of the payload and standard scratchroom into a fresh
    /// buffer drawn from the same pool (the original's `clone`).
    pub fn duplicate(&self, timeout_ms: TimeoutMs) -> Result<Self, Error> {
        let src = self.inner.lock();
        let mut out = self.pool.allocate(src.tail - src.data, timeout_ms)?;
        {
            let mut dst = out.inner.lock();
            dst.head = src.head;
            dst.data = src.data;
            dst.tail = src.tail;
            dst.std = src.std;
            dst.bytes[src.head..src.tail].copy_from_slice(&src.bytes[src.head..src.tail]);
        }
        Ok(out)
    }

    /// Reset head/data/tail to the start of the buffer and clear the
    /// standard scratchroom, keeping the underlying storage.
    pub fn reset(&self) {
        let mut b = self.inner.lock();
        b.head = 0;
        b.data = 0;
        b.tail = 0;
        b.std = StdScratchroom::default();
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    pub fn headroom(&self) -> usize {
        let b = self.inner.lock();
        b.data - b.head
    }

    pub fn tailroom(&self) -> usize {
        let b = self.inner.lock();
        b.capacity() - b.tail
    }

    /// Snapshot the current read cursor so a later pass can re-decode the
    /// same body (§4.8's validate-then-commit two-pass algorithm).
    pub fn mark(&self) -> usize {
        self.inner.lock().data
    }

    /// Rewind the read cursor to a mark taken earlier with [`Self::mark`].
    pub fn rewind_to(&self, mark: usize) {
        self.inner.lock().data = mark;
    }

    pub fn len(&self) -> usize {
        let b = self.inner.lock();
        b.tail - b.data
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn std(&self) -> StdScratchroom {
        self.inner.lock().std
    }

    pub fn set_std(&self, f: impl FnOnce(&mut StdScratchroom)) {
        let mut b = self.inner.lock();
        f(&mut b.std);
    }

    /// Reserve `len` bytes of headroom by moving `data` (and `head` if
    /// necessary) backwards. Used before pushing a header in front of an
    /// already-encoded body.
    ///
    /// # Test
    ///
    /// ```
    /// use thingset_codec::buffer::BufferPool;
    ///
    /// let pool = BufferPool::new(1, 64);
    /// let buf = pool.allocate(0, 0).unwrap();
    /// buf.reserve_headroom(4).unwrap();
    /// assert_eq!(buf.headroom(), 4);
    /// ```
    pub fn reserve_headroom(&self, len: usize) -> Result<(), Error> {
        let mut b = self.inner.lock();
        if len > b.data - b.head {
            return Err(Error::TooLarge);
        }
        b.data -= len;
        Ok(())
    }

    /// Reserve `len` bytes of tailroom so a subsequent push cannot fail.
    pub fn reserve_tailroom(&self, len: usize) -> Result<(), Error> {
        let b = self.inner.lock();
        if b.tail + len > b.capacity() {
            return Err(Error::TooLarge);
        }
        Ok(())
    }

    /// Read-only view of the current payload (`data..tail`).
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let b = self.inner.lock();
        f(&b.bytes[b.data..b.tail])
    }

    /// Append `bytes` at the tail, growing the payload forward (the
    /// original's `push`/`add`).
    pub fn push(&self, bytes: &[u8]) -> Result<(), Error> {
        let mut b = self.inner.lock();
        if b.tail + bytes.len() > b.capacity() {
            return Err(Error::TooLarge);
        }
        let tail = b.tail;
        b.bytes[tail..tail + bytes.len()].copy_from_slice(bytes);
        b.tail += bytes.len();
        Ok(())
    }

    /// Prepend `bytes` in front of `data`, consuming headroom (used to add
    /// a header after the body has already been written).
    pub fn push_front(&self, bytes: &[u8]) -> Result<(), Error> {
        let mut b = self.inner.lock();
        if bytes.len() > b.data - b.head {
            return Err(Error::TooLarge);
        }
        let start = b.data - bytes.len();
        b.bytes[start..b.data].copy_from_slice(bytes);
        b.data = start;
        Ok(())
    }

    /// Copy and consume `len` bytes from the front of the payload (the
    /// original's `pull`).
    pub fn pull(&self, len: usize, out: &mut [u8]) -> Result<(), Error> {
        let mut b = self.inner.lock();
        if len > b.tail - b.data || out.len() < len {
            return Err(Error::Incomplete);
        }
        let data = b.data;
        out[..len].copy_from_slice(&b.bytes[data..data + len]);
        b.data += len;
        Ok(())
    }

    /// Discard `len` bytes from the front of the payload without copying
    /// them out (the original's `remove`).
    pub fn remove_front(&self, len: usize) -> Result<(), Error> {
        let mut b = self.inner.lock();
        if len > b.tail - b.data {
            return Err(Error::Incomplete);
        }
        b.data += len;
        Ok(())
    }

    /// Discard `len` bytes from the back of the payload.
    pub fn remove_back(&self, len: usize) -> Result<(), Error> {
        let mut b = self.inner.lock();
        if len > b.tail - b.data {
            return Err(Error::Incomplete);
        }
        b.tail -= len;
        Ok(())
    }
}

impl std::ops::Drop for Buffer {
    fn drop(&mut self) {
        // Only the last handle releases the slot back to the pool.
        if Arc::strong_count(&self.inner) == 1 {
            self.pool.release();
        }
    }
}
