//! IN (device-to-host) handler.
//!
//! The CPU fills the transmit FIFO through the IN data register, then writes
//! the target endpoint to the IN control register to queue the transfer.
//! Only one transfer may be queued across the whole device; the queued latch
//! clears when the matching endpoint's transaction commits. The handler also
//! owns the 16-bit data-toggle vector, one DATA0/DATA1 bit per endpoint.

use core::sync::atomic::Ordering;
use std::sync::Arc;

use crate::event::EV_IN;
use crate::fifo::Consumer;
use crate::regs::{Registers, IN_CTRL_EPNO_MASK, IN_CTRL_QUEUED};
use crate::DATA_FIFO_DEPTH;

pub(crate) struct InHandler {
    fifo: Consumer<DATA_FIFO_DEPTH>,
    regs: Arc<Registers>,
    /// Expected DATA0/DATA1 parity for the next IN on each endpoint.
    /// All-ones out of reset.
    dtbs: u16,
}

impl InHandler {
    pub fn new(fifo: Consumer<DATA_FIFO_DEPTH>, regs: Arc<Registers>) -> Self {
        InHandler { fifo, regs, dtbs: 0xFFFF }
    }

    fn armed_epno(&self) -> u8 {
        self.regs.in_ctrl.load(Ordering::SeqCst) & IN_CTRL_EPNO_MASK
    }

    fn is_queued(&self) -> bool {
        self.regs.in_ctrl.load(Ordering::SeqCst) & IN_CTRL_QUEUED != 0
    }

    /// ACK-eligibility for an IN token on `ep`: a transfer is queued and it
    /// is queued for this endpoint.
    pub fn response(&self, ep: u8) -> bool {
        ep & 0xF == self.armed_epno() && self.is_queued()
    }

    /// Current toggle bit for `ep`; true => DATA1.
    pub fn dtb(&self, ep: u8) -> bool {
        self.dtbs >> (ep & 0xF) & 1 != 0
    }

    /// Head of the transmit queue, if any.
    pub fn tx_byte(&self) -> Option<u8> { self.fifo.peek() }

    /// The core accepted the offered byte.
    pub fn tx_advance(&mut self) {
        self.fifo.pop();
    }

    /// Force the armed endpoint's toggle to DATA1. Held asserted through the
    /// SETUP stage so the control status phase starts from a known parity.
    pub fn toggle_reset(&mut self) {
        self.dtbs |= 1 << self.armed_epno();
    }

    /// A transaction on `ep` committed with an ACK. Flips the toggle and
    /// releases the queued latch, but only if `ep` is the armed endpoint --
    /// a commit elsewhere must not disturb a pending transfer.
    pub fn commit(&mut self, ep: u8) {
        let epno = self.armed_epno();
        if ep & 0xF != epno {
            return;
        }
        self.dtbs ^= 1 << epno;
        self.regs.in_ctrl.fetch_and(!IN_CTRL_QUEUED, Ordering::SeqCst);
        self.regs.events.raise(EV_IN);
    }
}
