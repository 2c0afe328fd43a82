//! Byte-stream transports
//!
//! The session core never touches a device directly. It consumes byte chunks
//! from a [`ByteTransport`] and writes command bytes back to it.
//!
//! Supports:
//! - Serial ports (RS-232, RS-485, USB-Serial)
//! - In-memory scripted streams, for tests and offline replay

mod memory;
mod serial;
mod settings;

pub use memory::{MemoryHandle, MemoryTransport};
pub use serial::{list_ports, SerialTransport};
pub use settings::{ConnectionSettings, FlowControl, Parity, StopBits};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Setting the backend cannot drive
    #[error("Unsupported by this transport: {0}")]
    Unsupported(String),

    /// Settings failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Write calls
    pub writes: u64,
    /// Non-empty reads
    pub reads: u64,
    /// Errors count
    pub errors: u64,
    /// Connection uptime in seconds
    pub uptime_secs: u64,
}

/// Byte-in/byte-out transport consumed by the session driver
#[async_trait]
pub trait ByteTransport: Send + Sync {
    /// Open with the given line settings
    async fn open(&mut self, settings: &ConnectionSettings) -> Result<(), TransportError>;

    /// Close; closing a closed transport is a no-op
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if open
    fn is_open(&self) -> bool;

    /// Bytes available now, possibly empty
    async fn read(&mut self) -> Result<Bytes, TransportError>;

    /// Write a command
    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Human readable connection description
    fn description(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}
