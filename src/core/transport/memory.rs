//! In-memory transport
//!
//! Serves scripted inbound chunks and records every write. A
//! [`MemoryHandle`] stays with the caller after the transport has been moved
//! into a driver, to feed more data, inject failures and inspect commands.

use super::{ByteTransport, ConnectionSettings, TransportError, TransportStats};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug)]
enum Inbound {
    Chunk(Bytes),
    Error(io::ErrorKind),
}

#[derive(Debug, Default)]
struct Inner {
    inbound: VecDeque<Inbound>,
    written: Vec<Bytes>,
    open: bool,
    opened_with: Option<ConnectionSettings>,
    fail_open: Option<String>,
    fail_close: Option<io::ErrorKind>,
    fail_writes: bool,
    close_when_drained: bool,
    stats: TransportStats,
}

/// Scripted byte stream
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

/// Caller-side control of a [`MemoryTransport`]
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTransport {
    /// Empty transport; reads return nothing until data is pushed
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport preloaded with inbound chunks
    pub fn with_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let transport = Self::new();
        let handle = transport.handle();
        for chunk in chunks {
            handle.push(chunk);
        }
        transport
    }

    /// Control handle sharing this transport's state
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl MemoryHandle {
    /// Queue an inbound chunk
    pub fn push(&self, chunk: impl Into<Bytes>) {
        self.inner.lock().inbound.push_back(Inbound::Chunk(chunk.into()));
    }

    /// Queue a read failure
    pub fn push_error(&self, kind: io::ErrorKind) {
        self.inner.lock().inbound.push_back(Inbound::Error(kind));
    }

    /// Report `Disconnected` once the queued data is consumed
    pub fn close_when_drained(&self) {
        self.inner.lock().close_when_drained = true;
    }

    /// Make the next `open` fail
    pub fn fail_open(&self, message: impl Into<String>) {
        self.inner.lock().fail_open = Some(message.into());
    }

    /// Make the next `close` fail; the transport still ends up closed
    pub fn fail_close(&self, kind: io::ErrorKind) {
        self.inner.lock().fail_close = Some(kind);
    }

    /// Make writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Every chunk written so far
    pub fn written(&self) -> Vec<Bytes> {
        self.inner.lock().written.clone()
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Settings of the last successful open
    pub fn opened_with(&self) -> Option<ConnectionSettings> {
        self.inner.lock().opened_with.clone()
    }

    /// Queued inbound entries not read yet
    pub fn pending(&self) -> usize {
        self.inner.lock().inbound.len()
    }
}

#[async_trait]
impl ByteTransport for MemoryTransport {
    async fn open(&mut self, settings: &ConnectionSettings) -> Result<(), TransportError> {
        settings.validate()?;
        let mut inner = self.inner.lock();
        if let Some(message) = inner.fail_open.take() {
            return Err(TransportError::ConnectionFailed(message));
        }
        inner.open = true;
        inner.opened_with = Some(settings.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.open = false;
        match inner.fail_close.take() {
            Some(kind) => Err(io::Error::from(kind).into()),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    async fn read(&mut self) -> Result<Bytes, TransportError> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Err(TransportError::NotConnected);
        }
        match inner.inbound.pop_front() {
            Some(Inbound::Chunk(chunk)) => {
                inner.stats.bytes_received += chunk.len() as u64;
                inner.stats.reads += 1;
                Ok(chunk)
            }
            Some(Inbound::Error(kind)) => {
                inner.stats.errors += 1;
                Err(TransportError::Io(io::Error::from(kind)))
            }
            None if inner.close_when_drained => Err(TransportError::Disconnected),
            None => Ok(Bytes::new()),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Err(TransportError::NotConnected);
        }
        if inner.fail_writes {
            inner.stats.errors += 1;
            return Err(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        inner.written.push(Bytes::copy_from_slice(data));
        inner.stats.bytes_sent += data.len() as u64;
        inner.stats.writes += 1;
        Ok(data.len())
    }

    fn description(&self) -> String {
        "memory".to_string()
    }

    fn stats(&self) -> TransportStats {
        self.inner.lock().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_reads() {
        let mut transport = MemoryTransport::with_chunks([&b"W +1"[..], &b".000 kg\r\n"[..]]);
        let handle = transport.handle();

        assert!(matches!(transport.read().await, Err(TransportError::NotConnected)));
        transport.open(&ConnectionSettings::default()).await.unwrap();
        assert!(handle.is_open());

        assert_eq!(&transport.read().await.unwrap()[..], b"W +1");
        assert_eq!(&transport.read().await.unwrap()[..], b".000 kg\r\n");
        assert!(transport.read().await.unwrap().is_empty());

        handle.close_when_drained();
        assert!(matches!(transport.read().await, Err(TransportError::Disconnected)));
        assert_eq!(transport.stats().bytes_received, 13);
    }

    #[tokio::test]
    async fn test_writes_and_failures() {
        let mut transport = MemoryTransport::new();
        let handle = transport.handle();

        handle.fail_open("busy");
        assert!(matches!(
            transport.open(&ConnectionSettings::default()).await,
            Err(TransportError::ConnectionFailed(_))
        ));
        transport.open(&ConnectionSettings::new(4800)).await.unwrap();
        assert_eq!(handle.opened_with().map(|s| s.baud_rate), Some(4800));

        transport.write(b"Z\r\n").await.unwrap();
        assert_eq!(handle.written(), vec![Bytes::from_static(b"Z\r\n")]);

        handle.fail_writes(true);
        assert!(matches!(transport.write(b"T\r\n").await, Err(TransportError::Io(_))));

        handle.push_error(io::ErrorKind::BrokenPipe);
        assert!(matches!(transport.read().await, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_open_validates_settings() {
        let mut transport = MemoryTransport::new();
        let settings = ConnectionSettings::new(9600).data_bits(9);
        assert!(matches!(
            transport.open(&settings).await,
            Err(TransportError::InvalidSettings(_))
        ));
    }
}
