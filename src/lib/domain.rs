//! Domain logic, independent of any concrete mail transport.

pub mod dispatch;
pub mod mailer;
pub mod merge;
pub mod specification;
