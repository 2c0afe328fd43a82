//! Async session driver
//!
//! [`SessionDriver`] is the transport pump: one tokio task that owns the
//! [`ByteTransport`] and the [`Session`], reads chunks, sends periodic weight
//! requests and executes commands arriving from any number of cloned
//! [`SessionHandle`]s. Because only this task touches the session, a binary
//! frame split across reads is always reassembled in order.

use super::command::{self, DETECT_PROBE};
use super::protocol::{ProtocolId, ProtocolSelector};
use super::session::{Session, SessionError, SessionObserver, SessionStats};
use super::state_machine::SessionState;
use super::transport::{ByteTransport, ConnectionSettings, TransportError, TransportStats};
use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Driver timing
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Interval between weight requests for polled protocols
    pub poll_interval: Duration,
    /// Pause after an empty read
    pub idle_sleep: Duration,
    /// Send the `W` probe after opening when no protocol is selected
    pub probe_on_connect: bool,
    /// Command queue depth
    pub command_buffer: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            idle_sleep: Duration::from_millis(10),
            probe_on_connect: false,
            command_buffer: 32,
        }
    }
}

/// Snapshot of a running session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Current state
    pub state: SessionState,
    /// Active protocol
    pub protocol: Option<ProtocolId>,
    /// Session counters
    pub stats: SessionStats,
    /// Transport description
    pub transport: String,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Time since the last state change
    pub time_in_state: Option<Duration>,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum DriverCommand {
    Tare(Reply<()>),
    Zero(Reply<()>),
    Calibrate(f64, Reply<()>),
    SelectProtocol(ProtocolSelector, Reply<()>),
    SetTarget {
        target_kg: f64,
        tolerance_kg: Option<f64>,
        reply: Reply<()>,
    },
    ClearTarget(Reply<()>),
    Status(Reply<SessionStatus>),
    Disconnect(Reply<()>),
}

/// Cloneable control handle for a running driver
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<DriverCommand>,
}

impl std::fmt::Debug for DriverCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Tare(_) => "Tare",
            Self::Zero(_) => "Zero",
            Self::Calibrate(..) => "Calibrate",
            Self::SelectProtocol(..) => "SelectProtocol",
            Self::SetTarget { .. } => "SetTarget",
            Self::ClearTarget(_) => "ClearTarget",
            Self::Status(_) => "Status",
            Self::Disconnect(_) => "Disconnect",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> DriverCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Send the tare command
    pub async fn tare(&self) -> Result<(), SessionError> {
        self.request(DriverCommand::Tare).await
    }

    /// Send the zero command
    pub async fn zero(&self) -> Result<(), SessionError> {
        self.request(DriverCommand::Zero).await
    }

    /// Send a calibration command; a bad weight never reaches the driver
    pub async fn calibrate(&self, reference_weight_kg: f64) -> Result<(), SessionError> {
        command::validate_reference_weight(reference_weight_kg)?;
        self.request(|reply| DriverCommand::Calibrate(reference_weight_kg, reply))
            .await
    }

    /// Re-select the protocol
    pub async fn select_protocol(&self, selector: ProtocolSelector) -> Result<(), SessionError> {
        self.request(|reply| DriverCommand::SelectProtocol(selector, reply))
            .await
    }

    /// Watch for a target weight
    pub async fn set_target(
        &self,
        target_kg: f64,
        tolerance_kg: Option<f64>,
    ) -> Result<(), SessionError> {
        self.request(|reply| DriverCommand::SetTarget {
            target_kg,
            tolerance_kg,
            reply,
        })
        .await
    }

    /// Drop the target watch
    pub async fn clear_target(&self) -> Result<(), SessionError> {
        self.request(DriverCommand::ClearTarget).await
    }

    /// Current state and counters
    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(DriverCommand::Status).await
    }

    /// Close the transport and stop the driver
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(DriverCommand::Disconnect).await
    }
}

/// How a driver run ended
pub struct DriverOutcome<O> {
    /// The session, for its final state, history and observer
    pub session: Session<O>,
    /// `Ok` after an explicit disconnect; a failed close is returned to the
    /// caller of [`SessionHandle::disconnect`]
    pub result: Result<(), SessionError>,
}

/// Poll timer re-armed from the moment it fires; a stalled read delays the
/// next poll instead of queueing missed ones
struct PollClock {
    interval: Duration,
    next: Instant,
}

impl PollClock {
    fn new(interval: Duration, now: Instant) -> Self {
        Self { interval, next: now }
    }

    fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}

enum Flow {
    Continue,
    Stop(Result<(), SessionError>),
}

/// Transport pump for one session
pub struct SessionDriver<T, O> {
    transport: T,
    session: Session<O>,
    options: DriverOptions,
    commands: mpsc::Receiver<DriverCommand>,
    handles_alive: bool,
}

impl<T, O> SessionDriver<T, O>
where
    T: ByteTransport,
    O: SessionObserver + Send,
{
    /// Create a driver and its first handle
    pub fn new(transport: T, session: Session<O>, options: DriverOptions) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(options.command_buffer.max(1));
        let driver = Self {
            transport,
            session,
            options,
            commands: rx,
            handles_alive: true,
        };
        (driver, SessionHandle { tx })
    }

    /// Run on a new tokio task
    pub fn spawn(self, settings: ConnectionSettings) -> JoinHandle<DriverOutcome<O>>
    where
        T: 'static,
        O: 'static,
    {
        tokio::spawn(async move { self.run(&settings).await })
    }

    /// Open the transport and pump until disconnect or transport failure
    pub async fn run(mut self, settings: &ConnectionSettings) -> DriverOutcome<O> {
        let result = self.pump(settings).await;
        if let Err(e) = &result {
            debug!(error = %e, "driver stopped");
        }
        DriverOutcome {
            session: self.session,
            result,
        }
    }

    async fn pump(&mut self, settings: &ConnectionSettings) -> Result<(), SessionError> {
        self.session.begin_connect(settings)?;
        if let Err(e) = self.transport.open(settings).await {
            self.session.connection_failed(e.to_string())?;
            return Err(e.into());
        }
        self.session.connection_opened()?;
        info!(transport = %self.transport.description(), "session connected");

        if self.options.probe_on_connect && self.session.active_protocol().is_none() {
            if let Flow::Stop(result) = self.write(Bytes::from_static(DETECT_PROBE)).await {
                return result;
            }
        }

        let mut poll_clock = PollClock::new(self.options.poll_interval, Instant::now());
        loop {
            if poll_clock.fire(Instant::now()) {
                if let Some(poll) = self.session.poll_command() {
                    if let Flow::Stop(result) = self.write(poll).await {
                        return result;
                    }
                }
            }

            while self.handles_alive {
                match self.commands.try_recv() {
                    Ok(cmd) => {
                        if let Flow::Stop(result) = self.execute(cmd).await {
                            return result;
                        }
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => self.handles_alive = false,
                }
            }

            match self.transport.read().await {
                Ok(chunk) if chunk.is_empty() => {
                    let idle = tokio::time::sleep(self.options.idle_sleep);
                    let woken = tokio::select! {
                        cmd = self.commands.recv(), if self.handles_alive => Some(cmd),
                        _ = idle => None,
                    };
                    match woken {
                        Some(Some(cmd)) => {
                            if let Flow::Stop(result) = self.execute(cmd).await {
                                return result;
                            }
                        }
                        Some(None) => self.handles_alive = false,
                        None => {}
                    }
                }
                Ok(chunk) => {
                    self.session.feed(&chunk)?;
                }
                Err(e) => {
                    if matches!(e, TransportError::Disconnected) {
                        // stream ended; a last unterminated line still counts
                        self.session.finish()?;
                    }
                    return Err(self.fail(e).await);
                }
            }
        }
    }

    async fn fail(&mut self, error: TransportError) -> SessionError {
        if let Err(e) = self.session.transport_failed(&error) {
            warn!(error = %e, "could not record transport failure");
        }
        let _ = self.transport.close().await;
        error.into()
    }

    async fn write(&mut self, bytes: Bytes) -> Flow {
        match self.transport.write(&bytes).await {
            Ok(_) => {
                debug!(bytes = %hex::encode(&bytes), "command sent");
                Flow::Continue
            }
            Err(e) => Flow::Stop(Err(self.fail(e).await)),
        }
    }

    async fn send_command(&mut self, built: Result<Bytes, SessionError>, reply: Reply<()>) -> Flow {
        let bytes = match built {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = reply.send(Err(e));
                return Flow::Continue;
            }
        };
        match self.write(bytes).await {
            Flow::Continue => {
                let _ = reply.send(Ok(()));
                Flow::Continue
            }
            Flow::Stop(result) => {
                let _ = reply.send(Err(SessionError::NotConnected));
                Flow::Stop(result)
            }
        }
    }

    async fn execute(&mut self, cmd: DriverCommand) -> Flow {
        debug!(command = ?cmd, "driver command");
        match cmd {
            DriverCommand::Tare(reply) => {
                let built = self.session.tare_command();
                self.send_command(built, reply).await
            }
            DriverCommand::Zero(reply) => {
                let built = self.session.zero_command();
                self.send_command(built, reply).await
            }
            DriverCommand::Calibrate(weight, reply) => {
                let built = self.session.calibrate_command(weight);
                self.send_command(built, reply).await
            }
            DriverCommand::SelectProtocol(selector, reply) => {
                let _ = reply.send(self.session.select_protocol(selector));
                Flow::Continue
            }
            DriverCommand::SetTarget {
                target_kg,
                tolerance_kg,
                reply,
            } => {
                let _ = reply.send(self.session.set_target(target_kg, tolerance_kg));
                Flow::Continue
            }
            DriverCommand::ClearTarget(reply) => {
                self.session.clear_target();
                let _ = reply.send(Ok(()));
                Flow::Continue
            }
            DriverCommand::Status(reply) => {
                let _ = reply.send(Ok(self.status()));
                Flow::Continue
            }
            DriverCommand::Disconnect(reply) => {
                let closed = self.transport.close().await;
                let result = self.session.disconnect().and(closed.map_err(SessionError::from));
                // the requester gets the close error; the outcome keeps it only if nobody listened
                match reply.send(result) {
                    Ok(()) => Flow::Stop(Ok(())),
                    Err(unsent) => Flow::Stop(unsent),
                }
            }
        }
    }

    fn status(&self) -> SessionStatus {
        let TransportStats {
            bytes_sent,
            bytes_received,
            ..
        } = self.transport.stats();
        SessionStatus {
            state: self.session.state().clone(),
            protocol: self.session.active_protocol().map(|p| p.id()),
            stats: self.session.stats().clone(),
            transport: self.transport.description(),
            bytes_sent,
            bytes_received,
            time_in_state: self.session.time_in_state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::SessionEvent;
    use crate::core::transport::MemoryTransport;

    fn options() -> DriverOptions {
        DriverOptions {
            poll_interval: Duration::from_millis(20),
            idle_sleep: Duration::from_millis(1),
            ..DriverOptions::default()
        }
    }

    #[tokio::test]
    async fn test_stream_until_end() {
        let transport = MemoryTransport::with_chunks([&b"ST,GS,  +1.2"[..], &b"34 kg\r\nST,GS,  +2.000 kg"[..]]);
        transport.handle().close_when_drained();
        let session = Session::new(ProtocolSelector::Auto, Vec::<SessionEvent>::new());
        let (driver, _handle) = SessionDriver::new(transport, session, options());

        let outcome = driver.run(&ConnectionSettings::default()).await;
        assert!(matches!(
            outcome.result,
            Err(SessionError::Transport(TransportError::Disconnected))
        ));
        assert_eq!(outcome.session.state(), &SessionState::Disconnected);
        assert_eq!(outcome.session.stats().readings, 2);
        assert_eq!(
            outcome.session.active_protocol().map(|p| p.id()),
            Some(ProtocolId::TokvesSh50)
        );
    }

    #[tokio::test]
    async fn test_open_failure_is_error_state() {
        let transport = MemoryTransport::new();
        transport.handle().fail_open("port busy");
        let session = Session::new(ProtocolSelector::Auto, Vec::<SessionEvent>::new());
        let (driver, _handle) = SessionDriver::new(transport, session, options());

        let outcome = driver.run(&ConnectionSettings::default()).await;
        assert!(matches!(
            outcome.result,
            Err(SessionError::Transport(TransportError::ConnectionFailed(_)))
        ));
        assert!(matches!(outcome.session.state(), SessionState::Error { .. }));
    }

    #[tokio::test]
    async fn test_commands_through_handle() {
        let transport = MemoryTransport::new();
        let memory = transport.handle();
        let session = Session::new(ProtocolSelector::Auto, Vec::<SessionEvent>::new());
        let (driver, handle) = SessionDriver::new(transport, session, options());
        let task = driver.spawn(ConnectionSettings::default());

        assert!(matches!(
            handle.calibrate(-1.0).await,
            Err(SessionError::Command(_))
        ));
        assert!(matches!(handle.tare().await, Err(SessionError::NoActiveProtocol)));
        assert!(memory.written().is_empty());

        handle.select_protocol(ProtocolId::Ohaus.into()).await.unwrap();
        handle.tare().await.unwrap();
        handle.calibrate(12.5).await.unwrap();
        assert_eq!(
            memory.written(),
            vec![Bytes::from_static(b"Z\r\n"), Bytes::from_static(b"CAL 12.500\r\n")]
        );

        let status = handle.status().await.unwrap();
        assert_eq!(status.protocol, Some(ProtocolId::Ohaus));
        assert_eq!(status.bytes_sent, 15);
        assert!(status.time_in_state.is_some());

        handle.disconnect().await.unwrap();
        let outcome = task.await.unwrap();
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.session.state(), &SessionState::Disconnected);
        assert!(!memory.is_open());
        assert!(matches!(handle.tare().await, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_polls_binary_protocol() {
        let transport = MemoryTransport::new();
        let memory = transport.handle();
        memory.push(vec![0xc0, 0x05, 0x00, 0x00]);
        let session = Session::new(ProtocolId::Newton42Binary.into(), Vec::<SessionEvent>::new());
        let (driver, handle) = SessionDriver::new(transport, session, options());
        let task = driver.spawn(ConnectionSettings::default());

        let status = handle.status().await.unwrap();
        assert!(status.state.is_connected());
        handle.disconnect().await.unwrap();

        let outcome = task.await.unwrap();
        assert_eq!(memory.written()[0], Bytes::from_static(b"\x80P\r\n"));
        let events = outcome.session.into_observer();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Reading { reading } if reading.mass_kg() == 5.0
        )));
    }

    #[test]
    fn test_poll_clock_skips_missed_ticks() {
        let start = Instant::now();
        let mut clock = PollClock::new(Duration::from_millis(100), start);

        assert!(clock.fire(start));
        assert!(!clock.fire(start + Duration::from_millis(50)));
        // a read stalled for several intervals
        assert!(clock.fire(start + Duration::from_millis(450)));
        assert!(!clock.fire(start + Duration::from_millis(451)));
        assert!(!clock.fire(start + Duration::from_millis(549)));
        assert!(clock.fire(start + Duration::from_millis(550)));
    }

    #[tokio::test]
    async fn test_disconnect_reports_close_failure() {
        let transport = MemoryTransport::new();
        let memory = transport.handle();
        memory.fail_close(std::io::ErrorKind::BrokenPipe);
        let session = Session::new(ProtocolSelector::Auto, Vec::<SessionEvent>::new());
        let (driver, handle) = SessionDriver::new(transport, session, options());
        let task = driver.spawn(ConnectionSettings::default());

        assert!(matches!(
            handle.disconnect().await,
            Err(SessionError::Transport(TransportError::Io(_)))
        ));
        let outcome = task.await.unwrap();
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.session.state(), &SessionState::Disconnected);
        assert!(!memory.is_open());
    }

    #[tokio::test]
    async fn test_probe_on_connect() {
        let transport = MemoryTransport::new();
        let memory = transport.handle();
        let session = Session::new(ProtocolSelector::Auto, Vec::<SessionEvent>::new());
        let opts = DriverOptions {
            probe_on_connect: true,
            ..options()
        };
        let (driver, handle) = SessionDriver::new(transport, session, opts);
        let task = driver.spawn(ConnectionSettings::default());
        handle.disconnect().await.unwrap();
        task.await.unwrap();
        assert_eq!(memory.written(), vec![Bytes::from_static(b"W\r\n")]);
    }

    #[tokio::test]
    async fn test_write_failure_disconnects() {
        let transport = MemoryTransport::new();
        let memory = transport.handle();
        memory.fail_writes(true);
        let session = Session::new(ProtocolId::Sartorius.into(), Vec::<SessionEvent>::new());
        let (driver, handle) = SessionDriver::new(transport, session, options());
        let task = driver.spawn(ConnectionSettings::default());

        assert!(handle.tare().await.is_err());
        let outcome = task.await.unwrap();
        assert!(matches!(
            outcome.result,
            Err(SessionError::Transport(TransportError::Io(_)))
        ));
        assert_eq!(outcome.session.state(), &SessionState::Disconnected);
    }
}
