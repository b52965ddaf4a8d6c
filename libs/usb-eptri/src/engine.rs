//! Endpoint transaction engine.
//!
//! A finite state machine stepped once per transfer-core event. For every
//! token it decides SETUP/IN/OUT handling, multiplexes endpoint 0's control
//! sequence against the generic bulk/interrupt path, derives the stall
//! decision from the enable bitmaps, and routes payload bytes to the right
//! handler. The engine never blocks and never retries: a transaction runs to
//! IDLE, or is re-homed there by a protocol error or bus reset.

use core::sync::atomic::Ordering;
use std::sync::Arc;

use num_derive::FromPrimitive;
use usb_device::UsbDirection;

use crate::api::{CoreControl, CoreSignals, Token};
use crate::bridge::DebugBridge;
use crate::csr::UsbCsr;
use crate::ep_in::InHandler;
use crate::ep_out::OutHandler;
use crate::fifo::Fifo;
use crate::regs::Registers;
use crate::setup::SetupHandler;
use crate::{DATA_FIFO_DEPTH, SETUP_FIFO_DEPTH};

/// Engine stage, as reported through the diagnostic stage register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Stage {
    Idle = 0,
    TokenCheck = 1,
    Debug = 2,
    Setup = 3,
    ControlIn = 4,
    ControlOut = 5,
    WaitControlAckIn = 6,
    WaitControlAckOut = 7,
    In = 8,
    Out = 9,
    WaitDone = 10,
}

pub struct EndpointEngine {
    stage: Stage,
    regs: Arc<Registers>,
    setup: SetupHandler,
    ep_in: InHandler,
    ep_out: OutHandler,
    bridge: Option<Box<dyn DebugBridge>>,
    /// Token filter address latched while idle, so a SET_ADDRESS takes
    /// effect only between transactions.
    address: u8,
}

impl EndpointEngine {
    /// Build the engine plus the control-domain register view. The two ends
    /// may live on different threads; all shared state between them is the
    /// atomic register file and the three FIFOs.
    pub fn new() -> (EndpointEngine, UsbCsr) {
        let regs = Arc::new(Registers::new());
        let (setup_tx, setup_rx) = Fifo::<SETUP_FIFO_DEPTH>::new();
        let (in_tx, in_rx) = Fifo::<DATA_FIFO_DEPTH>::new();
        let (out_tx, out_rx) = Fifo::<DATA_FIFO_DEPTH>::new();
        let engine = EndpointEngine {
            stage: Stage::Idle,
            setup: SetupHandler::new(setup_tx, regs.clone()),
            ep_in: InHandler::new(in_rx, regs.clone()),
            ep_out: OutHandler::new(out_tx, regs.clone()),
            bridge: None,
            address: 0,
            regs: regs.clone(),
        };
        let csr = UsbCsr::new(regs, setup_rx, in_tx, out_rx);
        (engine, csr)
    }

    /// Attach a debug bridge; it takes over endpoint 0 whenever it reports a
    /// session in progress.
    pub fn set_bridge(&mut self, bridge: Box<dyn DebugBridge>) {
        self.bridge = Some(bridge);
    }

    pub fn stage(&self) -> Stage { self.stage }

    fn set_stage(&mut self, next: Stage) {
        if next != self.stage {
            log::trace!("stage {:?} -> {:?}", self.stage, next);
        }
        self.stage = next;
        self.regs.stage.store(next as u8, Ordering::SeqCst);
    }

    fn bridge_active(&self) -> bool {
        self.bridge.as_ref().map_or(false, |b| b.in_progress())
    }

    /// Advance the state machine by one transfer-core step.
    pub fn step(&mut self, sig: &CoreSignals) -> CoreControl {
        let mut ctl = CoreControl { address: self.address, ..Default::default() };

        if sig.bus_reset {
            // Re-home everything transaction-scoped; committed FIFO contents
            // stay for the CPU to drain.
            log::debug!("bus reset in {:?}", self.stage);
            self.regs.address.store(0, Ordering::SeqCst);
            self.address = 0;
            self.setup.idle_reset();
            self.set_stage(Stage::Idle);
            ctl.address = 0;
            return ctl;
        }
        if sig.error {
            log::debug!("transfer core error in {:?}", self.stage);
            Registers::bump(&self.regs.error_count);
            self.set_stage(Stage::Idle);
            ctl.reset = true;
            return ctl;
        }

        let dir = if sig.token == Token::In { UsbDirection::In } else { UsbDirection::Out };
        let should_stall = !self.regs.enabled(sig.endpoint, dir);

        match self.stage {
            Stage::Idle => {
                self.setup.idle_reset();
                self.address = self.regs.address.load(Ordering::SeqCst) & 0x7F;
                ctl.address = self.address;
                if sig.start {
                    self.set_stage(Stage::TokenCheck);
                }
            }
            Stage::TokenCheck => {
                Registers::bump(&self.regs.token_wait_count);
                if sig.idle {
                    self.set_stage(Stage::Idle);
                } else {
                    match sig.token {
                        Token::Setup => {
                            // SETUP must always be accepted, whatever the
                            // enable bits say.
                            ctl.arm = true;
                            self.setup.begin(sig.endpoint);
                            self.set_stage(Stage::Setup);
                        }
                        Token::In => {
                            ctl.stall = should_stall;
                            ctl.arm = self.ep_in.response(sig.endpoint) || should_stall;
                            self.set_stage(Stage::In);
                        }
                        Token::Out => {
                            self.ep_out.begin(sig.endpoint);
                            ctl.stall = should_stall;
                            ctl.arm = self.ep_out.response() || should_stall;
                            self.set_stage(Stage::Out);
                        }
                        Token::Sof => {
                            self.set_stage(Stage::Idle);
                        }
                    }
                }
            }
            Stage::Setup => {
                // Force the armed endpoint's toggle to DATA1 so the status
                // phase of this control transfer starts from known parity.
                self.ep_in.toggle_reset();
                ctl.arm = true;
                if let Some(b) = sig.rx_put {
                    self.setup.submit(b);
                }
                if sig.commit {
                    self.setup.commit();
                }
                if self.bridge_active() {
                    self.set_stage(Stage::Debug);
                } else if sig.setup_end {
                    let next = if self.setup.is_in() {
                        if self.setup.have_data_stage() {
                            Stage::ControlIn
                        } else {
                            Stage::WaitControlAckIn
                        }
                    } else if self.setup.have_data_stage() {
                        Stage::ControlOut
                    } else {
                        Stage::WaitControlAckOut
                    };
                    self.set_stage(next);
                } else if sig.end {
                    // transaction ended without a setup-complete pulse
                    Registers::bump(&self.regs.invalid_state_count);
                    self.set_stage(Stage::Idle);
                }
            }
            Stage::ControlIn => {
                if sig.token == Token::Setup && sig.start {
                    // the host abandoned this control transfer; a fresh SETUP
                    // is always accepted
                    ctl.arm = true;
                    self.setup.begin(sig.endpoint);
                    self.set_stage(Stage::Setup);
                } else if sig.endpoint == 0 {
                    match sig.token {
                        Token::In => {
                            if sig.tx_get {
                                self.ep_in.tx_advance();
                            }
                            ctl.tx_byte = self.ep_in.tx_byte();
                            ctl.stall = should_stall;
                            // hold off the data stage until the CPU has read
                            // the SETUP record that started it
                            ctl.arm =
                                should_stall || (self.setup.is_empty() && self.ep_in.response(0));
                            ctl.data_toggle = self.ep_in.dtb(0);
                            if sig.commit && ctl.arm && !ctl.stall {
                                self.ep_in.commit(0);
                            }
                        }
                        Token::Out => {
                            // host's zero-length status packet
                            ctl.arm = true;
                            self.ep_out.begin(0);
                            self.ep_out.ctrl_response();
                            self.set_stage(Stage::WaitDone);
                        }
                        _ => {}
                    }
                }
            }
            Stage::ControlOut => {
                if sig.token == Token::Setup && sig.start {
                    ctl.arm = true;
                    self.setup.begin(sig.endpoint);
                    self.set_stage(Stage::Setup);
                } else if sig.endpoint == 0 {
                    match sig.token {
                        Token::Out => {
                            if let Some(b) = sig.rx_put {
                                self.ep_out.receive(0, b);
                            }
                            ctl.stall = should_stall;
                            ctl.arm =
                                should_stall || (self.setup.is_empty() && self.ep_out.response());
                            if sig.commit && ctl.arm && !ctl.stall {
                                self.ep_out.commit();
                            }
                        }
                        Token::In => {
                            // zero-length status IN; DATA1 per the control
                            // transfer sequence
                            ctl.arm = self.setup.is_empty();
                            ctl.data_toggle = true;
                            self.set_stage(Stage::WaitDone);
                        }
                        _ => {}
                    }
                }
            }
            Stage::WaitControlAckIn => {
                if sig.token == Token::Setup && sig.start {
                    ctl.arm = true;
                    self.setup.begin(sig.endpoint);
                    self.set_stage(Stage::Setup);
                } else {
                    // zero-length status; hold ARM until the record is drained
                    ctl.arm = self.setup.is_empty();
                    ctl.data_toggle = true;
                    if sig.end && self.setup.is_empty() {
                        self.set_stage(Stage::Idle);
                    }
                }
            }
            Stage::WaitControlAckOut => {
                if sig.token == Token::Setup && sig.start {
                    ctl.arm = true;
                    self.setup.begin(sig.endpoint);
                    self.set_stage(Stage::Setup);
                } else {
                    ctl.arm = self.setup.is_empty();
                    ctl.data_toggle = true;
                    if sig.data_end && self.setup.is_empty() {
                        self.set_stage(Stage::Idle);
                    }
                }
            }
            Stage::In => {
                if sig.tx_get {
                    self.ep_in.tx_advance();
                }
                ctl.tx_byte = self.ep_in.tx_byte();
                ctl.stall = should_stall;
                ctl.arm = self.ep_in.response(sig.endpoint) || should_stall;
                ctl.data_toggle = self.ep_in.dtb(sig.endpoint);
                if sig.commit && ctl.arm && !ctl.stall {
                    self.ep_in.commit(sig.endpoint);
                }
                if sig.end {
                    self.set_stage(Stage::Idle);
                }
            }
            Stage::Out => {
                if let Some(b) = sig.rx_put {
                    self.ep_out.receive(sig.endpoint, b);
                }
                ctl.stall = should_stall;
                ctl.arm = self.ep_out.response() || should_stall;
                if sig.commit && ctl.arm && !ctl.stall {
                    self.ep_out.commit();
                }
                if sig.end {
                    self.set_stage(Stage::Idle);
                }
            }
            Stage::WaitDone => {
                ctl.arm = true;
                if sig.end {
                    self.set_stage(Stage::Idle);
                }
            }
            Stage::Debug => {
                let active = self.bridge_active();
                if let Some(bridge) = self.bridge.as_mut() {
                    if sig.tx_get {
                        bridge.tx_advance();
                    }
                    if let Some(b) = sig.rx_put {
                        bridge.receive(b);
                    }
                    ctl.tx_byte = bridge.tx_byte();
                    ctl.arm = sig.endpoint == 0 && (bridge.send_ack() || ctl.tx_byte.is_some());
                    ctl.data_toggle = true;
                }
                if !active {
                    self.set_stage(Stage::Idle);
                }
            }
        }
        ctl
    }
}
