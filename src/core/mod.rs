//! Core module containing the weighing engine
//!
//! This module provides:
//! - Protocol registry and per-family frame decoders
//! - Protocol auto-detection from ASCII sample lines
//! - Tare, zero, poll and calibration command builders
//! - Frame assembly over an arbitrary byte stream
//! - Session management with state machine and target watch
//! - Async session driver over a byte transport
//! - Transport layer (serial ports, in-memory streams)

pub mod command;
pub mod decoder;
pub mod detect;
pub mod driver;
pub mod framing;
pub mod protocol;
pub mod reading;
pub mod session;
pub mod state_machine;
pub mod target;
pub mod transport;
