//! SETUP packet handler.
//!
//! SETUP packets must always be ACKed, so they get a FIFO of their own: the
//! CPU can parse a record at its leisure without risking a NAK on the next
//! one. A record is 10 bytes (8 request bytes plus the CRC16) and a new
//! SETUP token unconditionally discards whatever the CPU had not read yet.

use std::sync::Arc;

use crate::event::EV_SETUP;
use crate::fifo::Producer;
use crate::regs::Registers;
use crate::SETUP_FIFO_DEPTH;

pub(crate) struct SetupHandler {
    fifo: Producer<SETUP_FIFO_DEPTH>,
    regs: Arc<Registers>,
    /// Which of the 10 record bytes the next `submit` lands on.
    byte_index: u8,
    /// bit 7 of byte 0: data stage (if any) is device-to-host.
    is_in: bool,
    /// Bytes 6/7 are wLength; nonzero means a data stage follows.
    have_data_stage: bool,
}

impl SetupHandler {
    pub fn new(fifo: Producer<SETUP_FIFO_DEPTH>, regs: Arc<Registers>) -> Self {
        SetupHandler { fifo, regs, byte_index: 0, is_in: false, have_data_stage: false }
    }

    /// A new SETUP token has been classified: drop any unread record and
    /// latch the destination endpoint.
    pub fn begin(&mut self, ep: u8) {
        self.fifo.clear();
        self.regs.setup_epno.store(ep & 0xF, core::sync::atomic::Ordering::SeqCst);
        self.byte_index = 0;
        self.is_in = false;
        self.have_data_stage = false;
    }

    /// One received record byte.
    pub fn submit(&mut self, byte: u8) {
        if !self.fifo.push(byte) {
            log::warn!("SETUP fifo overflow, dropping byte {:02x}", byte);
        }
        match self.byte_index {
            0 => self.is_in = byte & 0x80 != 0,
            6 | 7 => {
                if byte != 0 {
                    self.have_data_stage = true;
                }
            }
            _ => {}
        }
        self.byte_index = self.byte_index.saturating_add(1);
    }

    /// The record was committed on the wire; raise the CPU event once.
    pub fn commit(&mut self) {
        if !self.fifo.is_empty() {
            self.regs.events.raise(EV_SETUP);
        }
    }

    /// True once the CPU has drained the record. Gates the zero-length
    /// status handshake of a control transfer.
    pub fn is_empty(&self) -> bool { self.fifo.is_empty() }

    pub fn is_in(&self) -> bool { self.is_in }

    pub fn have_data_stage(&self) -> bool { self.have_data_stage }

    /// Clear the per-token classification sub-state. Called each idle step
    /// and on bus reset; committed record bytes are left for the CPU.
    pub fn idle_reset(&mut self) {
        self.byte_index = 0;
        self.is_in = false;
        self.have_data_stage = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::Fifo;

    fn handler() -> (SetupHandler, crate::fifo::Consumer<SETUP_FIFO_DEPTH>) {
        let (tx, rx) = Fifo::<SETUP_FIFO_DEPTH>::new();
        (SetupHandler::new(tx, Arc::new(Registers::new())), rx)
    }

    #[test]
    fn classifies_get_descriptor() {
        let (mut setup, rx) = handler();
        setup.begin(0);
        let record = [0x80u8, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00, 0xAA, 0x55];
        for &b in record.iter() {
            setup.submit(b);
        }
        assert!(setup.is_in());
        assert!(setup.have_data_stage());
        setup.commit();
        for &b in record.iter() {
            assert_eq!(rx.pop(), Some(b));
        }
        assert!(setup.is_empty());
    }

    #[test]
    fn classifies_zero_length_out() {
        let (mut setup, _rx) = handler();
        setup.begin(0);
        // SET_ADDRESS(5): host-to-device, wLength 0
        for &b in [0x00u8, 0x05, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00].iter() {
            setup.submit(b);
        }
        assert!(!setup.is_in());
        assert!(!setup.have_data_stage());
    }

    #[test]
    fn new_token_discards_unread_record() {
        let (mut setup, rx) = handler();
        setup.begin(0);
        for &b in [0x80u8, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00, 0x00, 0x00].iter() {
            setup.submit(b);
        }
        setup.commit();
        // CPU never drained; a fresh token overwrites
        setup.begin(2);
        for &b in [0x00u8, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x11, 0x22].iter() {
            setup.submit(b);
        }
        setup.commit();
        assert_eq!(rx.len(), 10);
        assert_eq!(rx.pop(), Some(0x00));
        assert_eq!(rx.pop(), Some(0x09));
        assert!(!setup.is_in());
    }
}
