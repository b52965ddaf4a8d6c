//! Types at the transfer-core boundary.
//!
//! The transfer core (bit-level token/CRC machinery) is external to this
//! crate. Its driver samples the core once per step, fills out a
//! [`CoreSignals`], hands it to [`EndpointEngine::step`](crate::EndpointEngine::step),
//! and applies the returned [`CoreControl`] back onto the core's arm/stall/
//! data lines.

/// Token type latched by the transfer core for the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Setup,
    In,
    Out,
    /// Start-of-frame marker; carries no data and is never routed to a handler.
    Sof,
}

/// Per-step snapshot of the transfer core's outputs.
#[derive(Debug, Clone, Copy)]
pub struct CoreSignals {
    pub token: Token,
    /// Target endpoint of the current token, 0..15.
    pub endpoint: u8,
    /// Pulse: a new transaction has started.
    pub start: bool,
    /// Pulse: the transaction has ended.
    pub end: bool,
    /// Pulse: the final data packet of the transaction completed.
    pub data_end: bool,
    /// Pulse: the SETUP stage finished (8 payload bytes + CRC16 accepted).
    pub setup_end: bool,
    /// Pulse: the packet was accepted and the handshake sent.
    pub commit: bool,
    /// Pulse: malformed frame, bad CRC, or bus timeout.
    pub error: bool,
    /// The bus is idle; no token is in flight.
    pub idle: bool,
    /// USB bus reset seen on the wire.
    pub bus_reset: bool,
    /// Payload byte received this step, if any.
    pub rx_put: Option<u8>,
    /// The core consumed the byte offered in the previous step's `tx_byte`.
    pub tx_get: bool,
}

impl Default for CoreSignals {
    fn default() -> Self {
        CoreSignals {
            token: Token::Sof,
            endpoint: 0,
            start: false,
            end: false,
            data_end: false,
            setup_end: false,
            commit: false,
            error: false,
            idle: true,
            bus_reset: false,
            rx_put: None,
            tx_get: false,
        }
    }
}

/// Per-step drive back onto the transfer core.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreControl {
    /// Accept this transaction (ACK eligible).
    pub arm: bool,
    /// Respond STALL. Takes precedence over `arm`.
    pub stall: bool,
    /// DATA0/DATA1 selector for the next IN payload; true => DATA1.
    pub data_toggle: bool,
    /// Outgoing payload byte currently offered, if any.
    pub tx_byte: Option<u8>,
    /// Force the transfer core back to its reset state.
    pub reset: bool,
    /// Token filter address, 7 bits. Loaded from the address register while
    /// the engine is idle; zeroed by a bus reset.
    pub address: u8,
}
