//! Batch report and summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{DeliveryOutcome, DeliveryStatus, FailureReason};
use crate::domain::specification::EmailAddress;

/// Every outcome of one batch, in recipient order
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    /// Identifier of the batch, also attached to its log events
    pub batch_id: Uuid,

    /// When the batch started
    pub started_at: DateTime<Utc>,

    /// When the batch finished
    pub finished_at: DateTime<Utc>,

    /// One outcome per recipient, in the order the recipients were listed
    pub outcomes: Vec<DeliveryOutcome>,
}

/// A failed recipient and why
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Recipient address
    pub address: EmailAddress,

    /// Why the message was not delivered
    pub reason: FailureReason,
}

/// Aggregated counts for a batch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Messages accepted by the server, including those with warnings
    pub sent: usize,

    /// Messages sent with unresolved placeholders
    pub sent_with_warnings: usize,

    /// Recipients that did not get their message
    pub failed: usize,

    /// Failed recipients in recipient order
    pub failures: Vec<Failure>,
}

impl Summary {
    /// Whether every recipient got their message
    pub fn all_sent(&self) -> bool {
        self.failed == 0
    }
}

impl Report {
    pub(crate) fn new(
        batch_id: Uuid,
        started_at: DateTime<Utc>,
        outcomes: Vec<DeliveryOutcome>,
    ) -> Self {
        Self {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    /// Counts sent and failed recipients and lists the failures
    pub fn summary(&self) -> Summary {
        self.outcomes
            .iter()
            .fold(Summary::default(), |mut summary, outcome| {
                match &outcome.status {
                    DeliveryStatus::Sent => summary.sent += 1,
                    DeliveryStatus::SentWithWarnings { .. } => {
                        summary.sent += 1;
                        summary.sent_with_warnings += 1;
                    }
                    DeliveryStatus::Failed(reason) => {
                        summary.failed += 1;
                        summary.failures.push(Failure {
                            address: outcome.address.clone(),
                            reason: reason.clone(),
                        });
                    }
                }

                summary
            })
    }
}
