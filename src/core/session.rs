//! Scale session
//!
//! A [`Session`] is the single stateful piece of the engine. It owns the
//! connection state machine, the active protocol, the frame assembler and
//! the target watch, and reports everything to a [`SessionObserver`].
//!
//! The session itself does no I/O and never blocks: a transport pump hands it
//! byte chunks with [`Session::feed`] and writes the command bytes it builds.
//! One caller feeds it at a time, so chunk handling and observer dispatch
//! happen as one step. See [`crate::core::driver`] for the async pump.

use super::command::{self, CommandError};
use super::decoder::{self, DecodeError};
use super::framing::FrameAssembler;
use super::protocol::{FrameShape, Protocol, ProtocolSelector};
use super::reading::WeightReading;
use super::state_machine::{InvalidTransition, SessionState, SessionStateMachine, StateTransition};
use super::target::TargetWatch;
use super::transport::{ConnectionSettings, TransportError};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Command could not be built
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Caller passed an unusable argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation needs an open connection
    #[error("not connected")]
    NotConnected,

    /// Auto-detection has not identified the device yet
    #[error("no active protocol: auto-detection has not matched a frame yet")]
    NoActiveProtocol,

    /// Lifecycle violation
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The driver owning the session has stopped
    #[error("session closed")]
    Closed,
}

/// Receives everything a session produces
pub trait SessionObserver {
    /// A decoded reading
    fn on_reading(&mut self, reading: &WeightReading);

    /// A non-fatal problem, such as a malformed frame
    fn on_diagnostic(&mut self, _message: &str) {}

    /// The session changed state
    fn on_state_change(&mut self, _state: &SessionState) {}

    /// A reading satisfied the target watch, which is now cleared
    fn on_target_reached(&mut self, _target_kg: f64) {}
}

/// Session events, for observers that forward over channels
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Reading decoded
    Reading {
        /// The reading
        reading: WeightReading,
    },
    /// Non-fatal diagnostic
    Diagnostic {
        /// Message
        message: String,
    },
    /// State changed
    StateChanged {
        /// New state
        state: SessionState,
    },
    /// Target weight reached
    TargetReached {
        /// Target that was reached
        target_kg: f64,
    },
}

impl SessionObserver for broadcast::Sender<SessionEvent> {
    fn on_reading(&mut self, reading: &WeightReading) {
        let _ = self.send(SessionEvent::Reading {
            reading: reading.clone(),
        });
    }

    fn on_diagnostic(&mut self, message: &str) {
        let _ = self.send(SessionEvent::Diagnostic {
            message: message.to_string(),
        });
    }

    fn on_state_change(&mut self, state: &SessionState) {
        let _ = self.send(SessionEvent::StateChanged {
            state: state.clone(),
        });
    }

    fn on_target_reached(&mut self, target_kg: f64) {
        let _ = self.send(SessionEvent::TargetReached { target_kg });
    }
}

/// Records events in order
impl SessionObserver for Vec<SessionEvent> {
    fn on_reading(&mut self, reading: &WeightReading) {
        self.push(SessionEvent::Reading {
            reading: reading.clone(),
        });
    }

    fn on_diagnostic(&mut self, message: &str) {
        self.push(SessionEvent::Diagnostic {
            message: message.to_string(),
        });
    }

    fn on_state_change(&mut self, state: &SessionState) {
        self.push(SessionEvent::StateChanged {
            state: state.clone(),
        });
    }

    fn on_target_reached(&mut self, target_kg: f64) {
        self.push(SessionEvent::TargetReached { target_kg });
    }
}

/// Session statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Frames cut from the byte stream
    pub frames: u64,
    /// Readings dispatched
    pub readings: u64,
    /// Frames skipped as noise (echo, unrelated line, truncated)
    pub ignored_frames: u64,
    /// Frames that failed validation
    pub malformed_frames: u64,
    /// Bytes dropped by the assembler
    pub discarded_bytes: u64,
    /// Target notifications fired
    pub targets_reached: u64,
}

/// Scale session
pub struct Session<O> {
    observer: O,
    machine: SessionStateMachine,
    selector: ProtocolSelector,
    active: Option<&'static Protocol>,
    assembler: FrameAssembler,
    buffer: BytesMut,
    target: Option<TargetWatch>,
    stats: SessionStats,
}

impl<O: SessionObserver> Session<O> {
    /// Create a disconnected session
    pub fn new(selector: ProtocolSelector, observer: O) -> Self {
        let active = selector.protocol();
        Self {
            observer,
            machine: SessionStateMachine::new(),
            selector,
            active,
            assembler: FrameAssembler::new(Self::shape_for(active)),
            buffer: BytesMut::with_capacity(1024),
            target: None,
            stats: SessionStats::default(),
        }
    }

    fn shape_for(protocol: Option<&Protocol>) -> FrameShape {
        protocol.map_or(FrameShape::Line, Protocol::shape)
    }

    /// Get current state
    pub fn state(&self) -> &SessionState {
        self.machine.state()
    }

    /// Get state history
    pub fn history(&self) -> &[StateTransition] {
        self.machine.history()
    }

    /// Time since the last state change
    pub fn time_in_state(&self) -> Option<Duration> {
        self.machine.time_in_state()
    }

    /// Get statistics
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Protocol selection as configured
    pub fn selector(&self) -> ProtocolSelector {
        self.selector
    }

    /// Explicit protocol, or the one auto-detection latched
    pub fn active_protocol(&self) -> Option<&'static Protocol> {
        self.active
    }

    /// Current target watch
    pub fn target(&self) -> Option<&TargetWatch> {
        self.target.as_ref()
    }

    /// Get the observer
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Get the observer mutably
    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Consume the session, returning the observer
    pub fn into_observer(self) -> O {
        self.observer
    }

    fn transition(&mut self, to: SessionState, reason: &str) -> Result<(), SessionError> {
        self.machine.transition(to, Some(reason))?;
        info!(state = %self.machine.state(), reason, "session state changed");
        self.observer.on_state_change(self.machine.state());
        Ok(())
    }

    fn reset_stream(&mut self) {
        self.buffer.clear();
        self.assembler = FrameAssembler::new(Self::shape_for(self.active));
    }

    /// `Disconnected -> Connecting`, after checking the settings
    pub fn begin_connect(&mut self, settings: &ConnectionSettings) -> Result<(), SessionError> {
        settings
            .validate()
            .map_err(|e| SessionError::InvalidArgument(e.to_string()))?;
        self.transition(SessionState::Connecting, "connect requested")
    }

    /// `Connecting -> Connected`
    pub fn connection_opened(&mut self) -> Result<(), SessionError> {
        self.active = self.selector.protocol();
        self.reset_stream();
        let protocol = self.active.map(Protocol::id);
        self.transition(SessionState::Connected { protocol }, "transport opened")
    }

    /// `Connecting -> Error`
    pub fn connection_failed(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        let message = message.into();
        warn!(%message, "connection failed");
        self.transition(SessionState::Error { message }, "transport open failed")
    }

    /// `Error -> Disconnected`
    pub fn acknowledge_error(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Disconnected, "error acknowledged")
    }

    /// Explicit disconnect from any state
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.reset_stream();
        if self.state() == &SessionState::Disconnected {
            return Ok(());
        }
        self.transition(SessionState::Disconnected, "disconnect requested")
    }

    /// A transport I/O failure: forced `Disconnected`, no retry
    pub fn transport_failed(&mut self, error: &TransportError) -> Result<(), SessionError> {
        warn!(%error, "transport failure");
        self.reset_stream();
        if self.state() == &SessionState::Disconnected {
            return Ok(());
        }
        let reason = format!("transport failure: {error}");
        self.transition(SessionState::Disconnected, &reason)
    }

    /// Switch protocol; pending partial frames are dropped
    pub fn select_protocol(&mut self, selector: ProtocolSelector) -> Result<(), SessionError> {
        self.selector = selector;
        self.active = selector.protocol();
        self.reset_stream();
        info!(protocol = %selector, "protocol selected");
        if self.state().is_connected() {
            let protocol = self.active.map(Protocol::id);
            self.transition(SessionState::Connected { protocol }, "protocol re-selected")?;
        }
        Ok(())
    }

    /// Watch for a target mass; `None` tolerance keeps the default
    pub fn set_target(&mut self, target_kg: f64, tolerance_kg: Option<f64>) -> Result<(), SessionError> {
        let watch = TargetWatch::new(target_kg)
            .ok_or_else(|| SessionError::InvalidArgument(format!("target {target_kg} is not finite")))?;
        let watch = match tolerance_kg {
            Some(tolerance) => watch.with_tolerance(tolerance).ok_or_else(|| {
                SessionError::InvalidArgument(format!("tolerance {tolerance} must be positive"))
            })?,
            None => watch,
        };
        debug!(target_kg, tolerance_kg = watch.tolerance_kg(), "target set");
        self.target = Some(watch);
        Ok(())
    }

    /// Drop the target watch
    pub fn clear_target(&mut self) {
        self.target = None;
    }

    /// Feed one inbound chunk. Returns the number of readings dispatched.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize, SessionError> {
        if !self.state().is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.buffer.extend_from_slice(chunk);

        let mut readings = 0;
        loop {
            match self.assembler.decode(&mut self.buffer) {
                Ok(Some(frame)) => readings += self.handle_frame(frame),
                Ok(None) => break,
                Err(e) => {
                    self.report(format!("framing error: {e}"));
                    self.buffer.clear();
                    break;
                }
            }
        }
        self.collect_discards();
        Ok(readings)
    }

    /// End of stream: decode whatever the assembler still holds
    pub fn finish(&mut self) -> Result<usize, SessionError> {
        if !self.state().is_connected() {
            return Err(SessionError::NotConnected);
        }
        let mut readings = 0;
        while let Ok(Some(frame)) = self.assembler.decode_eof(&mut self.buffer) {
            readings += self.handle_frame(frame);
        }
        self.collect_discards();
        Ok(readings)
    }

    fn collect_discards(&mut self) {
        let skipped = self.assembler.take_skipped();
        if skipped > 0 {
            debug!(skipped, "bytes outside frames dropped");
            self.stats.discarded_bytes += skipped as u64;
        }
        let overflow = self.assembler.take_overflow();
        if overflow > 0 {
            self.stats.discarded_bytes += overflow as u64;
            self.report(format!("dropped {overflow} bytes without a line terminator"));
        }
    }

    fn report(&mut self, message: String) {
        warn!(%message, "session diagnostic");
        self.observer.on_diagnostic(&message);
    }

    fn handle_frame(&mut self, frame: Bytes) -> usize {
        self.stats.frames += 1;

        let result = match self.active {
            Some(protocol) => decoder::decode_with(protocol, &frame),
            None => decoder::decode_auto(&frame).map(|(protocol, readings)| {
                self.latch(protocol);
                readings
            }),
        };

        match result {
            Ok(readings) => {
                let count = readings.len();
                for reading in &readings {
                    self.dispatch(reading);
                }
                count
            }
            Err(e) if e.is_benign() => {
                self.stats.ignored_frames += 1;
                debug!(error = %e, raw = %hex::encode(&frame), "frame ignored");
                0
            }
            Err(e) => {
                self.stats.malformed_frames += 1;
                self.report(malformed_message(&e, &frame));
                0
            }
        }
    }

    fn latch(&mut self, protocol: &'static Protocol) {
        self.active = Some(protocol);
        info!(protocol = protocol.name(), "protocol auto-detected");
        let state = SessionState::Connected {
            protocol: Some(protocol.id()),
        };
        if let Err(e) = self.transition(state, "protocol auto-detected") {
            warn!(error = %e, "latch transition rejected");
        }
    }

    fn dispatch(&mut self, reading: &WeightReading) {
        self.stats.readings += 1;
        self.observer.on_reading(reading);

        if let Some(watch) = self.target {
            if watch.is_satisfied_by(reading.mass_kg()) {
                self.target = None;
                self.stats.targets_reached += 1;
                info!(target_kg = watch.target_kg(), mass_kg = reading.mass_kg(), "target reached");
                self.observer.on_target_reached(watch.target_kg());
            }
        }
    }

    fn require_protocol(&self) -> Result<&'static Protocol, SessionError> {
        if !self.state().is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.active.ok_or(SessionError::NoActiveProtocol)
    }

    /// Bytes for a tare
    pub fn tare_command(&self) -> Result<Bytes, SessionError> {
        Ok(command::build_tare(self.require_protocol()?))
    }

    /// Bytes for a zero
    pub fn zero_command(&self) -> Result<Bytes, SessionError> {
        Ok(command::build_zero(self.require_protocol()?))
    }

    /// Bytes for a calibration; the weight is checked before anything else
    pub fn calibrate_command(&self, reference_weight_kg: f64) -> Result<Bytes, SessionError> {
        command::validate_reference_weight(reference_weight_kg)?;
        Ok(command::build_calibrate(self.require_protocol()?, reference_weight_kg)?)
    }

    /// Weight request for polled protocols; `None` while undetected or streaming
    pub fn poll_command(&self) -> Option<Bytes> {
        if !self.state().is_connected() {
            return None;
        }
        self.active.and_then(command::build_poll)
    }
}

fn malformed_message(error: &DecodeError, frame: &[u8]) -> String {
    match std::str::from_utf8(frame) {
        Ok(text) => format!("{error} in {text:?}"),
        Err(_) => format!("{error} in [{}]", hex::encode(frame)),
    }
}
