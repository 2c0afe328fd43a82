//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Reading output formats
//! - Logging initialisation

pub mod exit_codes;
pub mod logging;
pub mod output;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use logging::{effective_level, init_logging};
pub use output::{OutputFormat, ReadingFormatter};
