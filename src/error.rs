//! Error types for the DPDK backend
//!
//! Only conditions that stop a compilation outright live here. Problems found
//! in the program itself are reported through [`crate::diagnostics::Diagnostics`]
//! and checked at the driver checkpoints.

use thiserror::Error;

/// Backend errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Contract violations by the upstream collaborator
    /// The program has no `main` package instance
    ///
    /// **Triggered by:** a program tree handed over without a top-level package
    #[error("Program has no main package instance")]
    MissingMain,

    /// The main package does not bind a block the architecture requires
    #[error("Main package does not bind required block: {role}")]
    MissingBlock {
        /// Architecture role that is unbound
        role: String,
    },

    /// The main package type is not known to any supported architecture
    #[error("Unknown package type: {name}")]
    UnknownPackage {
        /// Package type name
        name: String,
    },

    /// An architecture name could not be parsed
    #[error("Unknown architecture: {name} (expected psa or pna)")]
    UnknownArchitecture {
        /// The rejected name
        name: String,
    },

    /// A pass broke its category contract
    ///
    /// **Triggered by:** a defect in a pass, never by the input program
    #[error("Pass {pass} violated its contract: {message}")]
    ContractViolation {
        /// Pass name
        pass: String,
        /// What went wrong
        message: String,
    },

    // Driver errors
    /// A driver operation was called in the wrong state
    #[error("Backend is in state {found}, expected {expected}")]
    InvalidState {
        /// State required by the operation
        expected: String,
        /// Current state
        found: String,
    },

    /// Compilation stopped at a checkpoint
    #[error("Compilation aborted with {errors} error(s)")]
    Aborted {
        /// Number of errors in the diagnostics sink
        errors: usize,
    },

    // Output errors
    /// A configured output destination could not be written
    #[error("Could not open file: {path}: {message}")]
    Io {
        /// Destination path
        path: String,
        /// Underlying I/O error message
        message: String,
    },

    /// A structured artifact could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an I/O error for a destination path
    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Create a contract violation for a pass
    pub fn contract(pass: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ContractViolation {
            pass: pass.into(),
            message: message.into(),
        }
    }

    /// Whether this error came from an output channel rather than the program
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message_names_path() {
        let err = Error::io(
            "/nonexistent/ctx.json",
            &std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        );
        assert!(err.is_io());
        assert!(err.to_string().contains("/nonexistent/ctx.json"));
    }

    #[test]
    fn test_contract_violation_display() {
        let err = Error::contract("StatementUnroll", "dangling reference to tmp_3");
        assert_eq!(
            err.to_string(),
            "Pass StatementUnroll violated its contract: dangling reference to tmp_3"
        );
    }
}
