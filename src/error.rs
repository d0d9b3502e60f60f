//! Error types for acadauto operations
//!
//! The automation server surfaces faults as numeric codes wrapped in a
//! [`ServerFault`]. Two specific codes mean "busy, retry the same call";
//! everything else is terminal. The retry policy is a pure function of
//! [`ServerFault::is_transient`] — call sites never inspect codes directly.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// HRESULT-style code for "call rejected, server busy"
pub const RPC_CALL_REJECTED: i32 = -2147418111;

/// HRESULT-style code for "server busy, retry the call later"
pub const RPC_RETRY_LATER: i32 = -2147418110;

/// A structured fault raised at the automation-server boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFault {
    /// Numeric fault code reported by the server
    pub code: i32,
    /// Human-readable description
    pub message: String,
}

impl ServerFault {
    /// Create a new fault from a code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Convenience constructor for a "server busy" fault
    pub fn busy() -> Self {
        Self::new(RPC_CALL_REJECTED, "call rejected: server busy")
    }

    /// True iff retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self.code, RPC_CALL_REJECTED | RPC_RETRY_LATER)
    }
}

impl std::fmt::Display for ServerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server fault {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServerFault {}

/// Main error type for acadauto operations
#[derive(Debug, Error)]
pub enum AutomationError {
    /// Fault raised by the automation server
    #[error("{0}")]
    Server(#[from] ServerFault),

    /// Operation failed after exhausting all retry attempts
    #[error("{operation} failed after {attempts} attempts")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<AutomationError>,
    },

    /// Neither attaching to a running server nor launching one succeeded
    #[error("automation server unavailable")]
    ServerUnavailable,

    /// No document became available within the connect timeout
    #[error("no open document after {waited_secs}s")]
    NoDocumentTimeout { waited_secs: u64 },

    /// Operation attempted on a disconnected session
    #[error("not connected to the automation server")]
    NotConnected,

    /// Referenced entity, handle or property no longer exists
    #[error("not found: {0}")]
    NotFound(String),

    /// New property value outside the declared bounds
    #[error("value {value} for {property} outside limits [{minimum}, {maximum}]")]
    OutOfRange {
        property: String,
        value: f64,
        minimum: f64,
        maximum: f64,
    },

    /// Attempt to write a read-only property
    #[error("property is read-only: {0}")]
    ReadOnly(String),

    /// Required input columns are missing
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Expected template file does not exist
    #[error("template not found: {}", .0.display())]
    TemplateMissing(PathBuf),

    /// Run stopped by cooperative cancellation
    #[error("cancelled")]
    Cancelled,

    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),
}

impl AutomationError {
    /// True iff the underlying fault is a transient server rejection
    pub fn is_transient(&self) -> bool {
        matches!(self, AutomationError::Server(fault) if fault.is_transient())
    }
}

impl From<String> for AutomationError {
    fn from(s: String) -> Self {
        AutomationError::Custom(s)
    }
}

impl From<&str> for AutomationError {
    fn from(s: &str) -> Self {
        AutomationError::Custom(s.to_string())
    }
}

/// Result type alias for acadauto operations
pub type Result<T> = std::result::Result<T, AutomationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes() {
        assert!(ServerFault::new(RPC_CALL_REJECTED, "busy").is_transient());
        assert!(ServerFault::new(RPC_RETRY_LATER, "later").is_transient());
        assert!(!ServerFault::new(-2147024894, "file not found").is_transient());
    }

    #[test]
    fn test_error_transience_follows_fault() {
        let err = AutomationError::Server(ServerFault::busy());
        assert!(err.is_transient());

        let err = AutomationError::NotFound("handle 2B1".to_string());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_out_of_range_display() {
        let err = AutomationError::OutOfRange {
            property: "Distance1".to_string(),
            value: 150.0,
            minimum: 0.0,
            maximum: 100.0,
        };
        let text = err.to_string();
        assert!(text.contains("150"));
        assert!(text.contains("[0, 100]"));
    }

    #[test]
    fn test_retry_exhausted_wraps_source() {
        let err = AutomationError::RetryExhausted {
            operation: "Open template".to_string(),
            attempts: 3,
            source: Box::new(AutomationError::Server(ServerFault::busy())),
        };
        assert_eq!(err.to_string(), "Open template failed after 3 attempts");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: AutomationError = io_err.into();
        assert!(matches!(err, AutomationError::Io(_)));
    }
}
