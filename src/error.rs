/*!
 * Error types for the alarm engine
 */

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::core::exclusion::ExclusionError;
use crate::core::ledger::LedgerError;
use crate::source::SourceError;

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug)]
pub enum MonitorError {
    /// I/O error
    Io(io::Error),

    /// Configuration error
    Config(String),

    /// Paging system rejected or failed a request
    Paging(String),

    /// HTTP transport failure talking to a remote collaborator
    Http(String),

    /// Exclusion source could not be read
    Exclusion(ExclusionError),

    /// Incident ledger (previous/current files) error
    Ledger(LedgerError),

    /// Device inventory could not be read
    Inventory(String),

    /// Sensor-reading collaborator failure
    Source(SourceError),

    /// Generic error with message
    Other(String),
}

impl MonitorError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }

    /// Check if this error is transient (a later run is likely to succeed)
    pub fn is_transient(&self) -> bool {
        match self {
            MonitorError::Io(io_err) => Self::is_io_transient(io_err),
            MonitorError::Http(_) => true,
            MonitorError::Paging(_) => true,
            MonitorError::Source(SourceError::Unreachable(_)) => true,
            _ => false,
        }
    }

    fn is_io_transient(io_err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            io_err.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | WouldBlock
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            MonitorError::Io(_) => ErrorCategory::IoError,
            MonitorError::Config(_) => ErrorCategory::Configuration,
            MonitorError::Paging(_) | MonitorError::Http(_) => ErrorCategory::Paging,
            MonitorError::Exclusion(_) | MonitorError::Ledger(_) => ErrorCategory::State,
            MonitorError::Inventory(_) => ErrorCategory::Inventory,
            MonitorError::Source(_) => ErrorCategory::Collaborator,
            MonitorError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local I/O errors
    IoError,
    /// Configuration errors
    Configuration,
    /// Paging system errors
    Paging,
    /// Exclusion and incident-ledger state errors
    State,
    /// Device inventory errors
    Inventory,
    /// Sensor-reading collaborator errors
    Collaborator,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Paging => write!(f, "paging"),
            ErrorCategory::State => write!(f, "state"),
            ErrorCategory::Inventory => write!(f, "inventory"),
            ErrorCategory::Collaborator => write!(f, "collaborator"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Io(err) => write!(f, "I/O error: {}", err),
            MonitorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MonitorError::Paging(msg) => write!(f, "Paging error: {}", msg),
            MonitorError::Http(msg) => write!(f, "HTTP error: {}", msg),
            MonitorError::Exclusion(err) => write!(f, "Exclusion error: {}", err),
            MonitorError::Ledger(err) => write!(f, "Incident ledger error: {}", err),
            MonitorError::Inventory(msg) => write!(f, "Inventory error: {}", msg),
            MonitorError::Source(err) => write!(f, "Sensor source error: {}", err),
            MonitorError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for MonitorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MonitorError::Io(err) => Some(err),
            MonitorError::Exclusion(err) => Some(err),
            MonitorError::Ledger(err) => Some(err),
            MonitorError::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for MonitorError {
    fn from(err: io::Error) -> Self {
        MonitorError::Io(err)
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Other(format!("JSON parse error: {}", err))
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Http(err.to_string())
    }
}

impl From<ExclusionError> for MonitorError {
    fn from(err: ExclusionError) -> Self {
        MonitorError::Exclusion(err)
    }
}

impl From<LedgerError> for MonitorError {
    fn from(err: LedgerError) -> Self {
        MonitorError::Ledger(err)
    }
}

impl From<ConfigError> for MonitorError {
    fn from(err: ConfigError) -> Self {
        MonitorError::Config(err.to_string())
    }
}

impl From<SourceError> for MonitorError {
    fn from(err: SourceError) -> Self {
        MonitorError::Source(err)
    }
}
