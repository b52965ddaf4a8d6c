//! Bounded single-producer/single-consumer byte queues.
//!
//! Each FIFO is split into a [`Producer`] and a [`Consumer`] half so the two
//! activity domains (protocol loop and CPU register interface) each hold
//! exactly one end. Occupancy is signalled through a pair of monotonically
//! advancing atomic indices; neither side ever blocks.
//!
//! `clear()` is the one operation that crosses the usual ownership split:
//! the producer discards unread bytes when a new record supersedes the old
//! one, possibly while the consumer is mid-drain. Both `clear` and `pop`
//! therefore advance `read` with a compare-exchange — `read` only ever moves
//! forward, and a pop that loses the race retries against the new index, so
//! a superseded byte is never returned. The slots themselves are atomic
//! bytes, ordered by the index handshake.

use core::array;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct Fifo<const DEPTH: usize> {
    storage: [AtomicU8; DEPTH],
    read: AtomicUsize,
    write: AtomicUsize,
}

impl<const DEPTH: usize> Fifo<DEPTH> {
    pub fn new() -> (Producer<DEPTH>, Consumer<DEPTH>) {
        let fifo = Arc::new(Fifo {
            storage: array::from_fn(|_| AtomicU8::new(0)),
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
        });
        (Producer { fifo: fifo.clone() }, Consumer { fifo })
    }

    fn len(&self) -> usize {
        self.write.load(Ordering::Acquire).wrapping_sub(self.read.load(Ordering::Acquire))
    }

    /// Discard everything queued at the time of the call by advancing `read`
    /// up to `write`. Retries if a concurrent `pop` moves `read` first.
    fn clear(&self) {
        let w = self.write.load(Ordering::Acquire);
        let mut r = self.read.load(Ordering::Acquire);
        while r != w {
            match self.read.compare_exchange(r, w, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(current) => r = current,
            }
        }
    }
}

pub(crate) struct Producer<const DEPTH: usize> {
    fifo: Arc<Fifo<DEPTH>>,
}

impl<const DEPTH: usize> Producer<DEPTH> {
    /// Append one byte. Returns false (and drops the byte) when full.
    pub fn push(&self, byte: u8) -> bool {
        let w = self.fifo.write.load(Ordering::Relaxed);
        let r = self.fifo.read.load(Ordering::Acquire);
        if w.wrapping_sub(r) >= DEPTH {
            return false;
        }
        self.fifo.storage[w % DEPTH].store(byte, Ordering::Relaxed);
        self.fifo.write.store(w.wrapping_add(1), Ordering::Release);
        true
    }

    pub fn len(&self) -> usize { self.fifo.len() }

    pub fn is_empty(&self) -> bool { self.fifo.len() == 0 }

    pub fn clear(&self) { self.fifo.clear() }
}

pub(crate) struct Consumer<const DEPTH: usize> {
    fifo: Arc<Fifo<DEPTH>>,
}

impl<const DEPTH: usize> Consumer<DEPTH> {
    /// Current head of the queue without advancing, the way a FIFO data
    /// register reads.
    pub fn peek(&self) -> Option<u8> {
        loop {
            let r = self.fifo.read.load(Ordering::Acquire);
            let w = self.fifo.write.load(Ordering::Acquire);
            if r == w {
                return None;
            }
            let byte = self.fifo.storage[r % DEPTH].load(Ordering::Relaxed);
            // a producer-side clear may have superseded the slot mid-read
            if self.fifo.read.load(Ordering::Acquire) == r {
                return Some(byte);
            }
        }
    }

    /// Advance past the head byte, returning it. Loses gracefully to a
    /// concurrent producer-side `clear`.
    pub fn pop(&self) -> Option<u8> {
        loop {
            let r = self.fifo.read.load(Ordering::Acquire);
            let w = self.fifo.write.load(Ordering::Acquire);
            if r == w {
                return None;
            }
            let byte = self.fifo.storage[r % DEPTH].load(Ordering::Relaxed);
            if self
                .fifo
                .read
                .compare_exchange(r, r.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(byte);
            }
        }
    }

    pub fn len(&self) -> usize { self.fifo.len() }

    pub fn is_empty(&self) -> bool { self.fifo.len() == 0 }

    pub fn clear(&self) { self.fifo.clear() }
}
