//! Control-domain register view.
//!
//! Everything the CPU sees: the three FIFO data/status/control register
//! groups, the global enable bitmaps and address register, the diagnostic
//! counters, and the shared event line. Method granularity follows the
//! register map one-to-one so a register-bus shim stays trivial.

use core::sync::atomic::Ordering;
use std::sync::Arc;

use num_traits::FromPrimitive;
use usb_device::UsbDirection;

use crate::engine::Stage;
use crate::event::{UsbEvents, EV_ALL};
use crate::fifo::{Consumer, Producer};
use crate::regs::{InCtrl, InStatus, OutCtrl, OutStatus, Registers, SetupStatus};
use crate::regs::{IN_CTRL_EPNO_MASK, IN_CTRL_QUEUED};
use crate::{DATA_FIFO_DEPTH, SETUP_FIFO_DEPTH};

pub struct UsbCsr {
    regs: Arc<Registers>,
    setup_fifo: Consumer<SETUP_FIFO_DEPTH>,
    in_fifo: Producer<DATA_FIFO_DEPTH>,
    out_fifo: Consumer<DATA_FIFO_DEPTH>,
}

impl UsbCsr {
    pub(crate) fn new(
        regs: Arc<Registers>,
        setup_fifo: Consumer<SETUP_FIFO_DEPTH>,
        in_fifo: Producer<DATA_FIFO_DEPTH>,
        out_fifo: Consumer<DATA_FIFO_DEPTH>,
    ) -> Self {
        UsbCsr { regs, setup_fifo, in_fifo, out_fifo }
    }

    // ------------------------------------------------------- global registers

    /// Set the 7-bit device address. Takes effect on the next idle step;
    /// cleared to 0 by a USB bus reset.
    pub fn set_address(&self, addr: u8) {
        self.regs.address.store(addr & 0x7F, Ordering::SeqCst);
    }

    pub fn address(&self) -> u8 { self.regs.address.load(Ordering::SeqCst) }

    /// Drive the bus pullup. Dropping it (disconnect) raises all three
    /// handler events so any waiters observe the change.
    pub fn set_pullup(&self, on: bool) {
        log::info!("usb pullup {}", if on { "on" } else { "off" });
        self.regs.pullup.store(on, Ordering::SeqCst);
        if !on {
            self.regs.events.raise(EV_ALL);
        }
    }

    pub fn pullup(&self) -> bool { self.regs.pullup.load(Ordering::SeqCst) }

    /// OUT-direction accept bits, one per endpoint. A zero forces STALL.
    pub fn set_enable_out(&self, bitmap: u16) {
        self.regs.enable_out.store(bitmap, Ordering::SeqCst);
    }

    /// IN-direction accept bits, one per endpoint. A zero forces STALL.
    pub fn set_enable_in(&self, bitmap: u16) {
        self.regs.enable_in.store(bitmap, Ordering::SeqCst);
    }

    /// Flip a single endpoint/direction accept bit.
    pub fn enable_endpoint(&self, dir: UsbDirection, ep: u8, enabled: bool) {
        let bit = 1u16 << (ep as u16 & 0xF);
        let reg = match dir {
            UsbDirection::In => &self.regs.enable_in,
            UsbDirection::Out => &self.regs.enable_out,
        };
        if enabled {
            reg.fetch_or(bit, Ordering::SeqCst);
        } else {
            reg.fetch_and(!bit, Ordering::SeqCst);
        }
    }

    /// Interleaved 32-bit enable view (bit `2*ep + is_in`).
    pub fn enable_bitmap(&self) -> u32 { self.regs.enable_bitmap() }

    pub fn stage_number(&self) -> u8 { self.regs.stage.load(Ordering::SeqCst) }

    /// Decoded form of the stage register.
    pub fn stage(&self) -> Option<Stage> { Stage::from_u8(self.stage_number()) }

    pub fn error_count(&self) -> u8 { self.regs.error_count.load(Ordering::SeqCst) }

    pub fn invalid_state_count(&self) -> u8 {
        self.regs.invalid_state_count.load(Ordering::SeqCst)
    }

    pub fn token_wait_count(&self) -> u8 { self.regs.token_wait_count.load(Ordering::SeqCst) }

    // ----------------------------------------------------------- event line

    pub fn ev_pending(&self) -> UsbEvents { UsbEvents(self.regs.events.pending()) }

    pub fn ev_clear(&self, events: UsbEvents) { self.regs.events.clear(events.0) }

    pub fn ev_enable(&self, events: UsbEvents) { self.regs.events.set_enable(events.0) }

    /// The shared interrupt line: any enabled pending event.
    pub fn irq(&self) -> bool { self.regs.events.irq() }

    // ---------------------------------------------------------------- SETUP

    /// Head of the SETUP record FIFO. Reads as 0 when empty.
    pub fn setup_data(&self) -> u8 { self.setup_fifo.peek().unwrap_or(0) }

    /// Advance the SETUP FIFO past the head byte.
    pub fn setup_advance(&self) {
        self.setup_fifo.pop();
    }

    pub fn setup_status(&self) -> SetupStatus {
        let mut status = SetupStatus(0);
        status.set_have(!self.setup_fifo.is_empty());
        status.set_epno(self.regs.setup_epno.load(Ordering::SeqCst));
        status.set_pending(self.regs.events.pending() & crate::event::EV_SETUP != 0);
        status
    }

    /// Drain the full pending record (8 request bytes + CRC16).
    pub fn setup_drain(&self) -> Vec<u8> {
        let mut record = Vec::new();
        while let Some(b) = self.setup_fifo.pop() {
            record.push(b);
        }
        record
    }

    // ------------------------------------------------------------------- IN

    /// Append one byte to the transmit FIFO. Returns false (byte dropped)
    /// past 128 bytes; callers are expected not to exceed one transaction's
    /// worth of data.
    pub fn in_data(&self, byte: u8) -> bool {
        let ok = self.in_fifo.push(byte);
        if !ok {
            log::warn!("IN fifo overflow, dropping byte {:02x}", byte);
        }
        ok
    }

    /// Raw IN control register write.
    pub fn in_ctrl(&self, ctrl: InCtrl) {
        if ctrl.reset() {
            self.in_fifo.clear();
            self.regs.in_ctrl.store(ctrl.epno() & IN_CTRL_EPNO_MASK, Ordering::SeqCst);
        } else {
            self.regs
                .in_ctrl
                .store(ctrl.epno() & IN_CTRL_EPNO_MASK | IN_CTRL_QUEUED, Ordering::SeqCst);
        }
    }

    /// Queue the FIFO contents for `ep`. Only one transfer may be in flight
    /// device-wide; wait for `in_status().idle()` before arming the next.
    pub fn in_arm(&self, ep: u8) {
        let mut ctrl = InCtrl(0);
        ctrl.set_epno(ep & 0xF);
        self.in_ctrl(ctrl);
    }

    /// Discard the transmit FIFO and the queued latch.
    pub fn in_reset(&self) {
        let mut ctrl = InCtrl(0);
        ctrl.set_reset(true);
        self.in_ctrl(ctrl);
    }

    pub fn in_status(&self) -> InStatus {
        let mut status = InStatus(0);
        status.set_have(!self.in_fifo.is_empty());
        status.set_idle(self.regs.in_ctrl.load(Ordering::SeqCst) & IN_CTRL_QUEUED == 0);
        status.set_pending(self.regs.events.pending() & crate::event::EV_IN != 0);
        status
    }

    // ------------------------------------------------------------------ OUT

    /// Head of the receive FIFO. Reads as 0 when empty.
    pub fn out_data(&self) -> u8 { self.out_fifo.peek().unwrap_or(0) }

    /// Raw OUT control register write. ADVANCE pops the FIFO head; ENABLE is
    /// latched from this write, so a drain that leaves it clear NAKs all
    /// further OUT traffic until rewritten.
    pub fn out_ctrl(&self, ctrl: OutCtrl) {
        if ctrl.advance() {
            self.out_fifo.pop();
        }
        self.regs.out_enable.store(ctrl.enable(), Ordering::SeqCst);
    }

    /// (Re)arm OUT reception without touching the FIFO.
    pub fn out_enable(&self, enable: bool) {
        let mut ctrl = OutCtrl(0);
        ctrl.set_enable(enable);
        self.out_ctrl(ctrl);
    }

    pub fn out_status(&self) -> OutStatus {
        let mut status = OutStatus(0);
        status.set_have(!self.out_fifo.is_empty());
        status.set_idle(self.regs.out_idle.load(Ordering::SeqCst));
        status.set_epno(self.regs.out_epno.load(Ordering::SeqCst));
        status.set_pending(self.regs.events.pending() & crate::event::EV_OUT != 0);
        status
    }

    /// Drain the receive FIFO, leaving the enable latch clear; the caller
    /// must re-enable to accept the next packet.
    pub fn out_drain(&self) -> Vec<u8> {
        let mut data = Vec::new();
        while !self.out_fifo.is_empty() {
            data.push(self.out_data());
            let mut ctrl = OutCtrl(0);
            ctrl.set_advance(true);
            self.out_ctrl(ctrl);
        }
        data
    }
}
