//! Shared interrupt fan-in for the three handlers.
//!
//! Each handler raises its own pending bit; the interrupt line is the OR of
//! the pending bits gated by a CPU-written enable mask. Pending bits stick
//! until the CPU clears them.

use core::sync::atomic::{AtomicU8, Ordering};

use bitfield::bitfield;

pub(crate) const EV_SETUP: u8 = 1 << 0;
pub(crate) const EV_IN: u8 = 1 << 1;
pub(crate) const EV_OUT: u8 = 1 << 2;
pub(crate) const EV_ALL: u8 = EV_SETUP | EV_IN | EV_OUT;

bitfield! {
    /// Pending/enable image for the shared event line.
    pub struct UsbEvents(u8);
    impl Debug;
    pub setup, set_setup: 0;
    pub ep_in, set_ep_in: 1;
    pub ep_out, set_ep_out: 2;
}

pub(crate) struct EventSet {
    pending: AtomicU8,
    enable: AtomicU8,
}

impl EventSet {
    pub fn new() -> Self {
        EventSet { pending: AtomicU8::new(0), enable: AtomicU8::new(0) }
    }

    pub fn raise(&self, bits: u8) {
        self.pending.fetch_or(bits & EV_ALL, Ordering::SeqCst);
    }

    pub fn pending(&self) -> u8 { self.pending.load(Ordering::SeqCst) }

    pub fn clear(&self, bits: u8) {
        self.pending.fetch_and(!bits, Ordering::SeqCst);
    }

    pub fn set_enable(&self, bits: u8) {
        self.enable.store(bits & EV_ALL, Ordering::SeqCst);
    }

    pub fn irq(&self) -> bool {
        self.pending.load(Ordering::SeqCst) & self.enable.load(Ordering::SeqCst) != 0
    }
}
