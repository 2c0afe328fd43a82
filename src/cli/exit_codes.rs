//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::command::CommandError;
use crate::core::decoder::DecodeError;
use crate::core::session::SessionError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Timed out before the requested readings arrived
    pub const TIMEOUT: u8 = 4;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 5;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 6;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 7;

    /// Frame could not be decoded
    pub const PROTOCOL_ERROR: u8 = 8;

    /// No protocol recognised
    pub const NOT_DETECTED: u8 = 9;

    /// Protocol has no such command
    pub const UNSUPPORTED_COMMAND: u8 = 10;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 12;

    /// Device closed the link
    pub const DISCONNECTED: u8 = 13;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Timeout
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::TIMEOUT, msg.into())
    }

    /// Map any error chain to its most specific exit code
    pub fn from_error(err: &anyhow::Error) -> Self {
        let code = err
            .chain()
            .find_map(code_for)
            .unwrap_or(ExitCodes::ERROR);
        Self::Error(code, format!("{err:#}"))
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn io_code(err: &std::io::Error) -> u8 {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
        ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
        ErrorKind::ConnectionRefused => ExitCodes::CONNECTION_FAILED,
        ErrorKind::TimedOut => ExitCodes::TIMEOUT,
        _ => ExitCodes::ERROR,
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::ConnectionFailed(_) | TransportError::NotConnected => {
            ExitCodes::CONNECTION_FAILED
        }
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::Unsupported(_) | TransportError::InvalidSettings(_) => {
            ExitCodes::INVALID_ARGS
        }
        TransportError::Disconnected => ExitCodes::DISCONNECTED,
        TransportError::Io(e) => io_code(e),
    }
}

fn command_code(err: &CommandError) -> u8 {
    match err {
        CommandError::InvalidArgument(_) => ExitCodes::INVALID_ARGS,
        CommandError::Unsupported { .. } => ExitCodes::UNSUPPORTED_COMMAND,
    }
}

fn code_for(err: &(dyn std::error::Error + 'static)) -> Option<u8> {
    if let Some(e) = err.downcast_ref::<SessionError>() {
        return Some(match e {
            SessionError::Command(e) => command_code(e),
            SessionError::Transport(e) => transport_code(e),
            SessionError::InvalidArgument(_) => ExitCodes::INVALID_ARGS,
            SessionError::NoActiveProtocol => ExitCodes::NOT_DETECTED,
            SessionError::NotConnected => ExitCodes::CONNECTION_FAILED,
            SessionError::InvalidTransition(_) | SessionError::Closed => ExitCodes::INTERNAL_ERROR,
        });
    }
    if let Some(e) = err.downcast_ref::<TransportError>() {
        return Some(transport_code(e));
    }
    if let Some(e) = err.downcast_ref::<CommandError>() {
        return Some(command_code(e));
    }
    if err.downcast_ref::<DecodeError>().is_some() {
        return Some(ExitCodes::PROTOCOL_ERROR);
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return Some(ExitCodes::CONFIG_ERROR);
    }
    err.downcast_ref::<std::io::Error>().map(io_code)
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        Self::Error(io_code(&err), err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Timed out",
        5 => "File not found",
        6 => "Permission denied",
        7 => "Configuration error",
        8 => "Protocol error",
        9 => "No protocol detected",
        10 => "Command not supported by protocol",
        11 => "Operation cancelled",
        12 => "Port not found",
        13 => "Device disconnected",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::ProtocolId;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::FILE_NOT_FOUND);
    }

    #[test]
    fn test_from_error_chain() {
        let err = anyhow::Error::new(SessionError::from(TransportError::PortNotFound(
            "COM9".into(),
        )))
        .context("opening scale");
        assert_eq!(CliResult::from_error(&err).code(), ExitCodes::PORT_NOT_FOUND);

        let err = anyhow::Error::new(CommandError::Unsupported {
            protocol: ProtocolId::MidlBinary,
            command: "calibrate",
        });
        assert_eq!(
            CliResult::from_error(&err).code(),
            ExitCodes::UNSUPPORTED_COMMAND
        );

        let err = anyhow::Error::new(DecodeError::NotAWeightFrame);
        assert_eq!(CliResult::from_error(&err).code(), ExitCodes::PROTOCOL_ERROR);

        let err = anyhow::anyhow!("something else");
        assert_eq!(CliResult::from_error(&err).code(), ExitCodes::ERROR);
    }

    #[test]
    fn test_descriptions_cover_table() {
        for code in [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 127] {
            assert_ne!(exit_code_description(code), "Unknown error");
        }
    }
}
