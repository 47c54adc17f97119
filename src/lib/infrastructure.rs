//! Adapters binding the domain to the outside world.

pub mod documents;
pub mod smtp;
