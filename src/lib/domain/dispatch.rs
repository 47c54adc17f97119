//! Batch delivery: one session, one outcome per recipient, one report per run.

mod errors;
mod outcome;
mod report;
mod service;

pub use errors::DispatchError;
pub use outcome::{DeliveryOutcome, DeliveryStatus, FailureReason};
pub use report::{Failure, Report, Summary};
pub use service::{DispatchConfig, Dispatcher};
