//! Session State Machine
//!
//! Connection lifecycle of a scale session:
//!
//! ```text
//! Disconnected --connect--> Connecting --opened--> Connected(protocol)
//!      ^                        |                      |
//!      |                        +--open failed--> Error(message)
//!      +------- disconnect / transport failure / acknowledge --+
//! ```

use super::protocol::ProtocolId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Session state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport open
    #[default]
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Transport open; `None` while auto-detection has not latched
    Connected {
        /// Active protocol
        protocol: Option<ProtocolId>,
    },
    /// Opening failed, waiting for the caller to acknowledge
    Error {
        /// Failure description
        message: String,
    },
}

impl SessionState {
    /// Check if state is connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Active protocol, if connected with one
    pub fn protocol(&self) -> Option<ProtocolId> {
        match self {
            Self::Connected { protocol } => *protocol,
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected { protocol: Some(id) } => write!(f, "connected ({id})"),
            Self::Connected { protocol: None } => write!(f, "connected (auto)"),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    /// State the machine was in
    pub from: SessionState,
    /// Requested state
    pub to: SessionState,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state
    pub from: SessionState,
    /// New state
    pub to: SessionState,
    /// Timestamp
    pub timestamp: DateTime<Local>,
    /// Reason for transition
    pub reason: Option<String>,
}

/// Session state machine
#[derive(Debug)]
pub struct SessionStateMachine {
    state: SessionState,
    history: Vec<StateTransition>,
    max_history: usize,
    last_transition: Option<Instant>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            history: Vec::new(),
            max_history: 100,
            last_transition: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Get state history, oldest first
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Get time in current state
    pub fn time_in_state(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    /// Transition to a new state
    pub fn transition(
        &mut self,
        new_state: SessionState,
        reason: Option<&str>,
    ) -> Result<(), InvalidTransition> {
        if !self.is_valid_transition(&new_state) {
            return Err(InvalidTransition {
                from: self.state.clone(),
                to: new_state,
            });
        }

        let from = std::mem::replace(&mut self.state, new_state);
        self.history.push(StateTransition {
            from,
            to: self.state.clone(),
            timestamp: Local::now(),
            reason: reason.map(String::from),
        });
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }
        self.last_transition = Some(Instant::now());
        Ok(())
    }

    /// Check if transition is valid
    pub fn is_valid_transition(&self, new_state: &SessionState) -> bool {
        use SessionState::*;

        match (&self.state, new_state) {
            (Disconnected, Connecting) => true,

            (Connecting, Connected { .. }) => true,
            (Connecting, Error { .. }) => true,
            (Connecting, Disconnected) => true,

            // protocol re-selection or auto-detection latch
            (Connected { .. }, Connected { .. }) => true,
            (Connected { .. }, Disconnected) => true,

            (Error { .. }, Disconnected) => true,

            (Disconnected, Disconnected) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_transitions() {
        let mut sm = SessionStateMachine::new();

        assert_eq!(sm.state(), &SessionState::Disconnected);

        sm.transition(SessionState::Connecting, Some("User initiated")).unwrap();
        assert_eq!(sm.state(), &SessionState::Connecting);

        sm.transition(SessionState::Connected { protocol: None }, Some("Opened"))
            .unwrap();
        assert!(sm.state().is_connected());
        assert_eq!(sm.state().protocol(), None);

        sm.transition(
            SessionState::Connected {
                protocol: Some(ProtocolId::Ohaus),
            },
            Some("Detected"),
        )
        .unwrap();
        assert_eq!(sm.state().protocol(), Some(ProtocolId::Ohaus));

        sm.transition(SessionState::Disconnected, None).unwrap();
        assert_eq!(sm.history().len(), 4);
        assert_eq!(sm.history()[0].reason.as_deref(), Some("User initiated"));
    }

    #[test]
    fn test_invalid_transition() {
        let mut sm = SessionStateMachine::new();

        // Can't go directly from Disconnected to Connected
        let result = sm.transition(SessionState::Connected { protocol: None }, None);
        assert_eq!(
            result,
            Err(InvalidTransition {
                from: SessionState::Disconnected,
                to: SessionState::Connected { protocol: None },
            })
        );
        assert!(sm.history().is_empty());
    }

    #[test]
    fn test_error_requires_acknowledge() {
        let mut sm = SessionStateMachine::new();
        sm.transition(SessionState::Connecting, None).unwrap();
        sm.transition(
            SessionState::Error {
                message: "port busy".into(),
            },
            None,
        )
        .unwrap();

        assert!(sm.transition(SessionState::Connecting, None).is_err());
        sm.transition(SessionState::Disconnected, Some("acknowledged"))
            .unwrap();
        assert_eq!(sm.state(), &SessionState::Disconnected);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut sm = SessionStateMachine::new();
        for _ in 0..60 {
            sm.transition(SessionState::Connecting, None).unwrap();
            sm.transition(SessionState::Disconnected, None).unwrap();
        }
        assert_eq!(sm.history().len(), 100);
        assert_eq!(sm.history()[99].to, SessionState::Disconnected);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SessionState::Connected {
                protocol: Some(ProtocolId::TokvesSh50)
            }
            .to_string(),
            "connected (TOKVES-SH50)"
        );
        assert_eq!(SessionState::Connected { protocol: None }.to_string(), "connected (auto)");
    }
}
