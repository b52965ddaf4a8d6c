//! Device-side transaction engine for a USB full-speed peripheral.
//!
//! The design centers on three small FIFOs with near-identical register
//! sets, one per traffic class:
//!
//! * SETUP: every SETUP record (8 bytes + CRC16) is captured and ACKed
//!   unconditionally; the CPU parses it at its own pace.
//! * IN: the CPU fills a transmit FIFO, then writes the target endpoint
//!   number to queue the transfer for the next matching IN token.
//! * OUT: received payloads land in a FIFO the CPU drains; acceptance is
//!   re-armed by every OUT control write.
//!
//! The [`EndpointEngine`] sequences tokens from an external transfer core
//! (the bit-level USB machinery) across up to 16 endpoints: endpoint 0 runs
//! the full control-transfer sequence, everything else takes the generic
//! bulk/interrupt path, and a 32-bit enable map turns any endpoint/direction
//! into a deterministic STALL. [`UsbCsr`] is the CPU's half: register-level
//! access to the FIFOs, enables, diagnostics, and the shared event line.
//!
//! The two halves follow a strict two-domain discipline (see `regs.rs`):
//! the protocol side never blocks and never takes a lock.

mod api;
mod bridge;
mod csr;
mod engine;
mod ep_in;
mod ep_out;
mod event;
mod fifo;
mod regs;
mod setup;
pub mod sim;

pub use api::{CoreControl, CoreSignals, Token};
pub use bridge::DebugBridge;
pub use csr::UsbCsr;
pub use engine::{EndpointEngine, Stage};
pub use event::UsbEvents;
pub use regs::{InCtrl, InStatus, OutCtrl, OutStatus, SetupStatus};

/// Endpoints addressed by the engine.
pub const NUM_ENDPOINTS: usize = 16;
/// One SETUP record: 8 request bytes plus the CRC16.
pub const SETUP_FIFO_DEPTH: usize = 10;
/// Per-transaction IN/OUT payload capacity.
pub const DATA_FIFO_DEPTH: usize = 128;
