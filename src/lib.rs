//! # Weighlink Core Library
//!
//! Protocol decoding and device control for weighing-scale indicators on a
//! serial link:
//! - MIDL MI VDA/12Ya, A&D, Sartorius, TOKVES SH-50, Ohaus, MIKROSIM M0601
//!   and NEWTON-42 ASCII lines
//! - NEWTON-42 and MIDL binary frames
//!
//! ## Features
//!
//! - Auto-detection of the protocol from the first recognisable line
//! - Tare, zero, poll and calibration commands per protocol
//! - Target weight watch with tolerance
//! - Session state machine with transition history
//! - Async driver over serial ports or scripted in-memory streams
//! - CLI with exit codes and text/JSON/CSV output
//!
//! ## Example
//!
//! ```rust,no_run
//! use weighlink_core::{
//!     ConnectionSettings, DriverOptions, ProtocolSelector, SerialTransport, Session,
//!     SessionDriver, SessionEvent,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (events, mut rx) = tokio::sync::broadcast::channel::<SessionEvent>(64);
//!     let session = Session::new(ProtocolSelector::Auto, events);
//!     let transport = SerialTransport::new("/dev/ttyUSB0");
//!     let (driver, handle) = SessionDriver::new(transport, session, DriverOptions::default());
//!     let task = driver.spawn(ConnectionSettings::new(9600));
//!
//!     handle.set_target(12.5, None).await?;
//!     while let Ok(event) = rx.recv().await {
//!         if let SessionEvent::TargetReached { target_kg } = event {
//!             println!("reached {target_kg} kg");
//!             break;
//!         }
//!     }
//!
//!     handle.disconnect().await?;
//!     task.await?.result?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::command::{
    build_calibrate, build_poll, build_tare, build_zero, CommandError, DETECT_PROBE,
};
pub use crate::core::decoder::{decode, decode_auto, decode_with, DecodeError};
pub use crate::core::detect::detect;
pub use crate::core::driver::{DriverOptions, SessionDriver, SessionHandle, SessionStatus};
pub use crate::core::framing::FrameAssembler;
pub use crate::core::protocol::{FrameKind, Protocol, ProtocolId, ProtocolSelector};
pub use crate::core::reading::{MassUnit, WeighMode, WeightReading};
pub use crate::core::session::{Session, SessionError, SessionEvent, SessionObserver, SessionStats};
pub use crate::core::state_machine::{SessionState, StateTransition};
pub use crate::core::target::TargetWatch;
pub use crate::core::transport::{
    ByteTransport, ConnectionSettings, FlowControl, MemoryTransport, Parity, SerialTransport,
    StopBits, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
