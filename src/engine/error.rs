//! Engine Error Types
//!
//! Every anomaly the engine can observe while handling pointer events degrades
//! to "no action taken" plus a log line. The error values exist so the caller
//! (and tests) can see *why* nothing happened, and so the log level is chosen
//! in one place.

use thiserror::Error;
use tracing::{debug, error, warn};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Event targeted an element with no configuration
    #[error("Unresolved element: {0}")]
    UnresolvedElement(String),

    /// Code matches none of the recognized prefixes
    #[error("Unknown code category: {0}")]
    UnknownCodeCategory(String),

    /// Both override slots reference each other
    #[error("Invalid override configuration on {element}: both short and long slots use the other slot's value")]
    InvalidOverride {
        /// Element the override is attached to
        element: String,
    },

    /// Timer fired for a gesture that already ended or whose context changed
    #[error("Stale timer firing: {0}")]
    StaleTimer(String),

    /// Modifier transition table is inconsistent
    #[error("Invalid modifier table: {0}")]
    InvalidModifierTable(String),

    /// Two elements share the same identifier
    #[error("Duplicate element id: {0}")]
    DuplicateElement(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Severity used to pick the log level for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Expected race or missing target; trace only
    Debug,
    /// Input the engine cannot map; action dropped
    Warn,
    /// Configuration mistake that the user has to fix
    Error,
}

/// Classify error for log level selection
pub fn classify_error(error: &EngineError) -> ErrorSeverity {
    match error {
        EngineError::UnresolvedElement(_) | EngineError::StaleTimer(_) => ErrorSeverity::Debug,

        EngineError::UnknownCodeCategory(_) => ErrorSeverity::Warn,

        EngineError::InvalidOverride { .. }
        | EngineError::InvalidModifierTable(_)
        | EngineError::DuplicateElement(_)
        | EngineError::InvalidConfig(_) => ErrorSeverity::Error,
    }
}

/// Log an error at the level its classification calls for
pub fn report(error: &EngineError) {
    match classify_error(error) {
        ErrorSeverity::Debug => debug!("{}", error),
        ErrorSeverity::Warn => warn!("{}", error),
        ErrorSeverity::Error => error!("{}", error),
    }
}
