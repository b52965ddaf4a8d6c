//! OUT (host-to-device) handler.
//!
//! Received payload bytes land in a FIFO the CPU drains through the OUT data
//! register. Acceptance is gated by an enable latch that is re-captured on
//! every OUT control write: after draining a packet the CPU must write
//! ENABLE=1 again or every further OUT token is NAKed. The `idle` status bit
//! drops on the first received byte and returns once a transaction carrying
//! data commits.

use core::sync::atomic::Ordering;
use std::sync::Arc;

use crate::event::EV_OUT;
use crate::fifo::Producer;
use crate::regs::Registers;
use crate::DATA_FIFO_DEPTH;

pub(crate) struct OutHandler {
    fifo: Producer<DATA_FIFO_DEPTH>,
    regs: Arc<Registers>,
}

impl OutHandler {
    pub fn new(fifo: Producer<DATA_FIFO_DEPTH>, regs: Arc<Registers>) -> Self {
        OutHandler { fifo, regs }
    }

    /// ACK-eligibility for an OUT token: the enable latch as captured by the
    /// most recent OUT control write.
    pub fn response(&self) -> bool {
        self.regs.out_enable.load(Ordering::SeqCst)
    }

    /// An OUT token was classified for `ep`. The status register tracks the
    /// endpoint even when the packet carries no data.
    pub fn begin(&mut self, ep: u8) {
        self.regs.out_epno.store(ep & 0xF, Ordering::SeqCst);
    }

    /// One received payload byte on `ep`.
    pub fn receive(&mut self, ep: u8, byte: u8) {
        if !self.fifo.push(byte) {
            log::warn!("OUT fifo overflow on ep{}, dropping byte {:02x}", ep & 0xF, byte);
        }
        self.regs.out_epno.store(ep & 0xF, Ordering::SeqCst);
        self.regs.out_idle.store(false, Ordering::SeqCst);
    }

    /// The transaction committed with an ACK.
    pub fn commit(&mut self) {
        if !self.fifo.is_empty() {
            self.regs.out_idle.store(true, Ordering::SeqCst);
        }
        self.regs.events.raise(EV_OUT);
    }

    /// Forced ACK for the control-transfer status phase; no FIFO data is
    /// involved but the CPU still gets its completion event.
    pub fn ctrl_response(&mut self) {
        self.regs.events.raise(EV_OUT);
    }
}
