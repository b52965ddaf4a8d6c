//! Host-side model for driving the engine without hardware.
//!
//! Plays the role of both the USB host and the transfer core: each
//! transaction is expanded into the step sequence the core would produce
//! (token classification, per-byte delivery, commit and end pulses) and the
//! ACK/NAK/STALL handshake is derived from the drive signals the engine
//! returns. Used by the integration tests and the `usb-sim` demo.

use crate::api::{CoreControl, CoreSignals, Token};
use crate::engine::{EndpointEngine, Stage};

/// Handshake the device answered with, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Ack,
    Nak,
    Stall,
}

fn handshake(ctl: &CoreControl) -> Handshake {
    if ctl.stall {
        Handshake::Stall
    } else if ctl.arm {
        Handshake::Ack
    } else {
        Handshake::Nak
    }
}

/// USB CRC16 (poly 0x8005, reflected), as appended to DATA packets.
pub fn crc16(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
        }
    }
    let crc = !crc;
    [crc as u8, (crc >> 8) as u8]
}

pub struct Host {
    engine: EndpointEngine,
}

impl Host {
    pub fn new(engine: EndpointEngine) -> Self { Host { engine } }

    pub fn engine(&self) -> &EndpointEngine { &self.engine }

    pub fn engine_mut(&mut self) -> &mut EndpointEngine { &mut self.engine }

    fn token_sig(token: Token, endpoint: u8) -> CoreSignals {
        CoreSignals { token, endpoint, idle: false, ..Default::default() }
    }

    /// One quiet bus step.
    pub fn step_idle(&mut self) -> CoreControl { self.engine.step(&CoreSignals::default()) }

    /// Address the transfer core is currently filtering on.
    pub fn device_address(&mut self) -> u8 { self.step_idle().address }

    pub fn bus_reset(&mut self) {
        self.engine.step(&CoreSignals { bus_reset: true, ..Default::default() });
    }

    /// Inject a malformed-frame error pulse.
    pub fn protocol_error(&mut self) {
        self.engine.step(&CoreSignals { error: true, idle: false, ..Default::default() });
    }

    /// Start-of-frame marker.
    pub fn sof(&mut self) {
        if self.engine.stage() == Stage::Idle {
            self.engine.step(&CoreSignals { start: true, idle: false, ..Default::default() });
            self.engine.step(&Self::token_sig(Token::Sof, 0));
        }
    }

    /// Issue a token. From idle this costs a start pulse plus the
    /// classification step; mid-control-transfer the engine takes the token
    /// directly. Returns the drive signals carrying the arm/stall decision.
    fn begin_token(&mut self, token: Token, endpoint: u8) -> CoreControl {
        let sig = Self::token_sig(token, endpoint);
        let start = CoreSignals { start: true, ..sig };
        if self.engine.stage() == Stage::Idle {
            self.engine.step(&start);
            self.engine.step(&sig)
        } else {
            self.engine.step(&start)
        }
    }

    /// End-of-transaction pulses.
    fn finish(&mut self, token: Token, endpoint: u8) {
        let sig = CoreSignals { end: true, data_end: true, ..Self::token_sig(token, endpoint) };
        self.engine.step(&sig);
    }

    /// Deliver a SETUP transaction: 8 request bytes plus generated CRC16.
    /// The device must answer ACK; anything else is a contract violation the
    /// caller asserts on.
    pub fn setup(&mut self, endpoint: u8, request: [u8; 8]) -> Handshake {
        self.begin_token(Token::Setup, endpoint);
        let sig = Self::token_sig(Token::Setup, endpoint);
        for &b in request.iter().chain(crc16(&request).iter()) {
            self.engine.step(&CoreSignals { rx_put: Some(b), ..sig });
        }
        let ctl = self.engine.step(&CoreSignals { commit: true, ..sig });
        let hs = handshake(&ctl);
        self.engine.step(&CoreSignals { setup_end: true, end: true, data_end: true, ..sig });
        hs
    }

    /// Issue an IN token and collect the device's response: the handshake,
    /// the payload (empty for a zero-length packet), and the DATA0/DATA1
    /// toggle the packet carried.
    pub fn in_transfer(&mut self, endpoint: u8) -> (Handshake, Vec<u8>, bool) {
        let first = self.begin_token(Token::In, endpoint);
        let hs = handshake(&first);
        if hs != Handshake::Ack {
            self.finish(Token::In, endpoint);
            return (hs, Vec::new(), false);
        }
        let mut sig = Self::token_sig(Token::In, endpoint);
        let mut ctl = self.engine.step(&sig);
        let toggle = ctl.data_toggle;
        let mut data = Vec::new();
        while let Some(b) = ctl.tx_byte {
            data.push(b);
            sig.tx_get = true;
            ctl = self.engine.step(&sig);
        }
        sig.tx_get = false;
        sig.commit = true;
        self.engine.step(&sig);
        self.finish(Token::In, endpoint);
        (Handshake::Ack, data, toggle)
    }

    /// Issue an OUT token carrying `data` and return the handshake.
    pub fn out_transfer(&mut self, endpoint: u8, data: &[u8]) -> Handshake {
        let first = self.begin_token(Token::Out, endpoint);
        let hs = handshake(&first);
        if hs != Handshake::Ack {
            self.finish(Token::Out, endpoint);
            return hs;
        }
        let sig = Self::token_sig(Token::Out, endpoint);
        for &b in data {
            self.engine.step(&CoreSignals { rx_put: Some(b), ..sig });
        }
        self.engine.step(&CoreSignals { commit: true, ..sig });
        self.finish(Token::Out, endpoint);
        Handshake::Ack
    }
}
