//! Interface boundary for the debug/bridge side channel.
//!
//! A bridge session claims endpoint 0 exclusively: while `in_progress` is
//! true the engine suspends normal SETUP/IN/OUT routing for endpoint 0 and
//! shuttles bytes directly between the transfer core and the bridge. What
//! the bridge does with them (register pokes over the control channel, in
//! practice) is outside this crate.

pub trait DebugBridge: Send {
    /// True while the bridge has claimed endpoint 0.
    fn in_progress(&self) -> bool;

    /// Next byte to transmit toward the host, if any.
    fn tx_byte(&self) -> Option<u8>;

    /// The core consumed the offered byte.
    fn tx_advance(&mut self);

    /// The bridge wants a bare ACK for the current transaction even without
    /// transmit data.
    fn send_ack(&self) -> bool;

    /// Payload byte received from the host while the session is active.
    fn receive(&mut self, byte: u8);
}
