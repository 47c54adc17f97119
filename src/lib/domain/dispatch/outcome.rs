//! Per-recipient delivery outcomes

use std::fmt;

use serde::Serialize;

use crate::domain::specification::EmailAddress;

/// Why a recipient did not get their message
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureReason {
    /// Placeholders had no field and strict rendering is on
    Unresolved(Vec<String>),

    /// The message could not be assembled
    Build(String),

    /// The server refused the message
    Rejected(String),

    /// The transport session failed before or while sending
    Session(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved(placeholders) => {
                write!(f, "unresolved placeholders: {}", placeholders.join(", "))
            }
            Self::Build(reason) => write!(f, "could not build message: {reason}"),
            Self::Rejected(reason) => write!(f, "rejected by server: {reason}"),
            Self::Session(reason) => write!(f, "session error: {reason}"),
        }
    }
}

/// Terminal state of one recipient's delivery
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Accepted by the server
    Sent,

    /// Accepted by the server, with placeholders left as written
    SentWithWarnings {
        /// The placeholders that had no field
        unresolved: Vec<String>,
    },

    /// Not delivered
    Failed(FailureReason),
}

/// The recorded result for one recipient
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    /// Recipient address
    pub address: EmailAddress,

    /// What happened
    pub status: DeliveryStatus,
}

impl DeliveryOutcome {
    /// Whether the server accepted the message
    pub fn is_sent(&self) -> bool {
        matches!(
            self.status,
            DeliveryStatus::Sent | DeliveryStatus::SentWithWarnings { .. }
        )
    }

    /// The failure reason, if the message was not delivered
    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            DeliveryStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
