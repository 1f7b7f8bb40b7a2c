//! Error types for distrual
//!
//! All hub, node and codec errors are funneled through [`Error`].

use crate::types::ChildId;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// distrual error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Registry
    // ========================================================================
    #[error("Child limit ({capacity}) reached")]
    CapacityExceeded { capacity: usize },

    #[error("Failed to launch '{program}': {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No child with ID {0} exists")]
    UnknownChild(ChildId),

    // ========================================================================
    // Dispatch
    // ========================================================================
    #[error("Child {0} has not announced its address yet")]
    AddressUnknown(ChildId),

    #[error("RPC error: {0}")]
    Rpc(String),

    // ========================================================================
    // Protocol
    // ========================================================================
    #[error("Decode error: {0}")]
    Decode(String),

    // ========================================================================
    // Process outcome
    // ========================================================================
    #[error("Exited abnormally: {0}")]
    AbnormalExit(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors that are the operator's doing and get printed as a plain reason
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::CapacityExceeded { .. }
                | Error::LaunchFailed { .. }
                | Error::UnknownChild(_)
                | Error::AddressUnknown(_)
                | Error::InvalidInput(_)
        )
    }

    /// Launch failure helper
    pub fn launch_failed(program: impl Into<String>, source: std::io::Error) -> Self {
        Error::LaunchFailed {
            program: program.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_classification() {
        assert!(Error::UnknownChild(ChildId(99)).is_user_facing());
        assert!(Error::CapacityExceeded { capacity: 20 }.is_user_facing());
        assert!(!Error::Decode("bad".into()).is_user_facing());
        assert!(!Error::Internal("oops".into()).is_user_facing());
    }

    #[test]
    fn test_messages_name_the_reason() {
        assert_eq!(
            Error::CapacityExceeded { capacity: 20 }.to_string(),
            "Child limit (20) reached"
        );
        assert_eq!(
            Error::UnknownChild(ChildId(7)).to_string(),
            "No child with ID 7 exists"
        );

        let err = Error::launch_failed(
            "/no/such/bin",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.to_string().contains("/no/such/bin"));
    }
}
