//! Cross-domain register backing store.
//!
//! Every field here is shared between the protocol domain (the engine,
//! advancing in lock-step with bus activity) and the control domain (the
//! CPU's asynchronous register accesses). Each field has a single writing
//! domain; the other side only reads. The two exceptions are documented
//! inline: the address register (CPU-written, engine-zeroed on bus reset)
//! and the IN queued bit (CPU-set, engine-cleared on commit).

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

use bitfield::bitfield;
use usb_device::UsbDirection;

use crate::event::EventSet;

bitfield! {
    /// SETUP status register image.
    pub struct SetupStatus(u8);
    pub have, set_have: 0;
    pub epno, set_epno: 5, 2;
    pub pending, set_pending: 6;
}

bitfield! {
    /// IN status register image.
    pub struct InStatus(u8);
    pub have, set_have: 0;
    pub idle, set_idle: 1;
    pub pending, set_pending: 6;
}

bitfield! {
    /// OUT status register image.
    pub struct OutStatus(u8);
    pub have, set_have: 0;
    pub idle, set_idle: 1;
    pub epno, set_epno: 5, 2;
    pub pending, set_pending: 6;
}

bitfield! {
    /// IN control register: target endpoint plus a FIFO reset bit.
    pub struct InCtrl(u8);
    impl Debug;
    pub epno, set_epno: 3, 0;
    pub reset, set_reset: 4;
}

bitfield! {
    /// OUT control register: pop the FIFO head and/or (re)latch the enable.
    pub struct OutCtrl(u8);
    impl Debug;
    pub advance, set_advance: 0;
    pub enable, set_enable: 1;
}

use core::fmt;

impl fmt::Debug for SetupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SETUP[ep{} {}{}]",
            self.epno(),
            if self.have() { "have " } else { "" },
            if self.pending() { "pend" } else { "" }
        )
    }
}

impl fmt::Debug for InStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IN[{}{}{}]",
            if self.have() { "have " } else { "" },
            if self.idle() { "idle " } else { "busy " },
            if self.pending() { "pend" } else { "" }
        )
    }
}

impl fmt::Debug for OutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OUT[ep{} {}{}{}]",
            self.epno(),
            if self.have() { "have " } else { "" },
            if self.idle() { "idle " } else { "busy " },
            if self.pending() { "pend" } else { "" }
        )
    }
}

/// Low nibble of `in_ctrl`: the armed endpoint number.
pub(crate) const IN_CTRL_EPNO_MASK: u8 = 0x0F;
/// Internal latch, not a CSR bit: a transfer is queued and unacknowledged.
pub(crate) const IN_CTRL_QUEUED: u8 = 0x10;

pub(crate) struct Registers {
    /// 7-bit device address. CPU writes; the engine zeroes it on bus reset.
    pub address: AtomicU8,
    /// Bus pullup state. CPU-only.
    pub pullup: AtomicBool,
    /// Per-endpoint OUT-direction accept bits. CPU-only writer.
    pub enable_out: AtomicU16,
    /// Per-endpoint IN-direction accept bits. CPU-only writer.
    pub enable_in: AtomicU16,
    /// Armed IN endpoint + queued latch. CPU arms; engine clears the latch.
    pub in_ctrl: AtomicU8,
    /// OUT acceptance, latched from every OUT control write. CPU-only writer.
    pub out_enable: AtomicBool,
    /// Endpoint of the most recent SETUP token. Engine-only writer.
    pub setup_epno: AtomicU8,
    /// Endpoint of the transaction filling the OUT FIFO. Engine-only writer.
    pub out_epno: AtomicU8,
    /// OUT handler idle flag. Engine-only writer.
    pub out_idle: AtomicBool,
    /// Current engine stage number (diagnostic). Engine-only writer.
    pub stage: AtomicU8,
    pub error_count: AtomicU8,
    pub invalid_state_count: AtomicU8,
    pub token_wait_count: AtomicU8,
    pub events: EventSet,
}

impl Registers {
    pub fn new() -> Self {
        Registers {
            address: AtomicU8::new(0),
            pullup: AtomicBool::new(false),
            enable_out: AtomicU16::new(0),
            enable_in: AtomicU16::new(0),
            in_ctrl: AtomicU8::new(0),
            out_enable: AtomicBool::new(false),
            setup_epno: AtomicU8::new(0),
            out_epno: AtomicU8::new(0),
            out_idle: AtomicBool::new(true),
            stage: AtomicU8::new(0),
            error_count: AtomicU8::new(0),
            invalid_state_count: AtomicU8::new(0),
            token_wait_count: AtomicU8::new(0),
            events: EventSet::new(),
        }
    }

    /// Is traffic on (endpoint, direction) accepted? Evaluated fresh on every
    /// step; a CPU enable write takes effect on the very next token.
    pub fn enabled(&self, ep: u8, dir: UsbDirection) -> bool {
        let bits = match dir {
            UsbDirection::In => self.enable_in.load(Ordering::SeqCst),
            UsbDirection::Out => self.enable_out.load(Ordering::SeqCst),
        };
        bits & (1 << (ep as u16 & 0xF)) != 0
    }

    /// Interleaved 32-bit view of the enable state: bit `2*ep + is_in`.
    pub fn enable_bitmap(&self) -> u32 {
        let out = self.enable_out.load(Ordering::SeqCst);
        let inp = self.enable_in.load(Ordering::SeqCst);
        let mut bitmap = 0u32;
        for ep in 0..crate::NUM_ENDPOINTS {
            if out >> ep & 1 != 0 {
                bitmap |= 1 << (2 * ep);
            }
            if inp >> ep & 1 != 0 {
                bitmap |= 1 << (2 * ep + 1);
            }
        }
        bitmap
    }

    /// Saturating bump for the 8-bit diagnostic counters.
    pub fn bump(counter: &AtomicU8) {
        let v = counter.load(Ordering::SeqCst);
        if v < u8::MAX {
            counter.store(v + 1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_views_agree() {
        let regs = Registers::new();
        regs.enable_out.store(0b0000_0000_0000_0101, Ordering::SeqCst);
        regs.enable_in.store(0b1000_0000_0000_0001, Ordering::SeqCst);
        assert!(regs.enabled(0, UsbDirection::Out));
        assert!(!regs.enabled(1, UsbDirection::Out));
        assert!(regs.enabled(2, UsbDirection::Out));
        assert!(regs.enabled(0, UsbDirection::In));
        assert!(regs.enabled(15, UsbDirection::In));
        assert!(!regs.enabled(15, UsbDirection::Out));
        let bm = regs.enable_bitmap();
        assert_eq!(bm & 0b11, 0b11); // ep0 both directions
        assert_eq!(bm >> (2 * 2) & 0b11, 0b01); // ep2 OUT only
        assert_eq!(bm >> (2 * 15) & 0b11, 0b10); // ep15 IN only
    }

    #[test]
    fn counters_saturate() {
        let c = AtomicU8::new(0xFE);
        Registers::bump(&c);
        assert_eq!(c.load(Ordering::SeqCst), 0xFF);
        Registers::bump(&c);
        assert_eq!(c.load(Ordering::SeqCst), 0xFF);
    }
}
