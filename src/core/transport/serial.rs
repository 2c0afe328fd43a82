//! Serial port transport implementation

use super::{
    ByteTransport, ConnectionSettings, FlowControl, Parity, StopBits, TransportError,
    TransportStats,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const READ_BUFFER: usize = 4096;

/// Serial port transport
pub struct SerialTransport {
    port_name: String,
    settings: Option<ConnectionSettings>,
    port: Mutex<Option<Box<dyn SerialPort + Send>>>,
    stats: RwLock<TransportStats>,
    connected_at: Option<Instant>,
}

impl SerialTransport {
    /// Transport for a named port (e.g. `COM3`, `/dev/ttyUSB0`), not yet opened
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            settings: None,
            port: Mutex::new(None),
            stats: RwLock::new(TransportStats::default()),
            connected_at: None,
        }
    }

    /// Port name
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn line_settings(
        settings: &ConnectionSettings,
    ) -> Result<(serialport::DataBits, serialport::Parity, serialport::StopBits), TransportError>
    {
        let data_bits = match settings.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(TransportError::InvalidSettings(format!(
                    "data bits must be 5-8, got {other}"
                )))
            }
        };

        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Space | Parity::Mark => {
                return Err(TransportError::Unsupported(format!(
                    "{:?} parity",
                    settings.parity
                )))
            }
        };

        let stop_bits = match settings.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
            StopBits::OnePointFive => {
                return Err(TransportError::Unsupported("1.5 stop bits".into()))
            }
        };

        Ok((data_bits, parity, stop_bits))
    }
}

#[async_trait]
impl ByteTransport for SerialTransport {
    async fn open(&mut self, settings: &ConnectionSettings) -> Result<(), TransportError> {
        settings.validate()?;
        let (data_bits, parity, stop_bits) = Self::line_settings(settings)?;

        let flow_control = match settings.flow_control {
            FlowControl::Hardware => serialport::FlowControl::Hardware,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::None => serialport::FlowControl::None,
        };

        let port = serialport::new(&self.port_name, settings.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(self.port_name.clone()),
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(self.port_name.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(self.port_name.clone())
                }
                serialport::ErrorKind::InvalidInput => {
                    TransportError::InvalidSettings(e.to_string())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        *self.port.lock() = Some(port);
        self.settings = Some(settings.clone());
        self.connected_at = Some(Instant::now());
        *self.stats.write() = TransportStats::default();

        info!(port = %self.port_name, %settings, "serial port opened");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.port.lock().take().is_some() {
            debug!(port = %self.port_name, "serial port closed");
        }
        self.connected_at = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.lock().is_some()
    }

    async fn read(&mut self) -> Result<Bytes, TransportError> {
        let mut port_guard = self.port.lock();
        let port = port_guard.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buffer = vec![0u8; READ_BUFFER];

        match port.read(&mut buffer) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                drop(port_guard);
                buffer.truncate(n);

                let mut stats = self.stats.write();
                stats.bytes_received += n as u64;
                stats.reads += 1;

                Ok(Bytes::from(buffer))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // No data available, return empty
                Ok(Bytes::new())
            }
            Err(e) => {
                drop(port_guard);
                self.stats.write().errors += 1;
                Err(TransportError::Io(e))
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut port_guard = self.port.lock();
        let port = port_guard.as_mut().ok_or(TransportError::NotConnected)?;

        let result = port.write_all(data).and_then(|()| port.flush());
        drop(port_guard);

        let mut stats = self.stats.write();
        match result {
            Ok(()) => {
                stats.bytes_sent += data.len() as u64;
                stats.writes += 1;
                Ok(data.len())
            }
            Err(e) => {
                stats.errors += 1;
                Err(TransportError::Io(e))
            }
        }
    }

    fn description(&self) -> String {
        match &self.settings {
            Some(settings) => format!("{} @ {}", self.port_name, settings),
            None => self.port_name.clone(),
        }
    }

    fn stats(&self) -> TransportStats {
        let mut stats = self.stats.read().clone();
        if let Some(connected_at) = self.connected_at {
            stats.uptime_secs = connected_at.elapsed().as_secs();
        }
        stats
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::Io(e.into()))
}
