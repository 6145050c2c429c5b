//! Session error taxonomy.
//!
//! Adapters return `anyhow::Error`; the orchestrator recovers these variants
//! with `downcast_ref::<SessionError>()` to decide whether a failure is absorbed
//! into stall counting or ends the session.
//!
//! | Variant             | Recoverable | Effect                          |
//! |---------------------|-------------|---------------------------------|
//! | `SecurityViolation` | no          | session ends, path is reported  |
//! | `LedgerParse`       | yes         | counted as a non-progress turn  |
//! | `UnknownSpeaker`    | yes         | counted as a non-progress turn  |
//! | `InputCancelled`    | no          | session ends immediately        |

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A path resolved outside the confinement root.
    #[error("{message}")]
    SecurityViolation { path: PathBuf, message: String },

    /// The decision backend returned something that does not fit the ledger schema.
    #[error("malformed progress ledger: {reason}")]
    LedgerParse { reason: String, raw: String },

    /// The ledger picked a speaker that is not on the team.
    #[error("ledger selected unknown speaker '{name}' (allowed: {})", allowed.join(", "))]
    UnknownSpeaker { name: String, allowed: Vec<String> },

    /// A pending human-input wait was cancelled externally.
    #[error("human input cancelled")]
    InputCancelled,
}

impl SessionError {
    pub fn security_violation(path: PathBuf) -> Self {
        let message = format!(
            "Access to the path {} is not allowed, TERMINATE the program immediately.",
            path.display()
        );
        SessionError::SecurityViolation { path, message }
    }

    /// Turn-local validation failures the orchestrator absorbs as stalls.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::LedgerParse { .. } | SessionError::UnknownSpeaker { .. }
        )
    }
}
