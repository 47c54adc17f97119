//! Errors that end a batch early

use thiserror::Error;

use super::Report;
use crate::domain::{
    mailer::{BuildError, SessionError},
    specification::SchemaError,
};

/// A document-level or session-level failure.
///
/// Per-recipient failures never surface here; they are recorded in that recipient's outcome.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The document is invalid; nothing was sent
    #[error("invalid specification: {0}")]
    Schema(#[from] SchemaError),

    /// A resource shared by every message (attachment, sender address) is unusable; nothing
    /// was sent
    #[error("could not prepare messages: {0}")]
    Build(#[from] BuildError),

    /// The transport session could not be opened; nothing was sent
    #[error("could not open a transport session: {0}")]
    Open(#[source] SessionError),

    /// The session failed part way; every recipient not yet sent is marked failed
    #[error("transport session failed mid-batch: {source}")]
    SessionLost {
        /// What broke the session
        #[source]
        source: SessionError,
        /// Outcomes for the whole batch, including the abandoned recipients
        report: Box<Report>,
    },
}

impl DispatchError {
    /// The partial report, when the batch got as far as sending
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::SessionLost { report, .. } => Some(report),
            _ => None,
        }
    }
}
