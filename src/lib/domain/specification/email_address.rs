//! Email Address

use std::fmt;

use lazy_static::lazy_static;
use lettre::Address;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use EmailAddressError::*;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// An error that can occur when creating an email address
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailAddressError {
    /// The email address is empty
    #[error("email is empty")]
    EmptyEmailAddress,

    /// The email address is invalid
    #[error("email is invalid")]
    InvalidEmailAddress,
}

/// A syntactically valid email address, accepted by the mail library as well
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new email address
    pub fn new(raw: &str) -> Result<Self, EmailAddressError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(EmptyEmailAddress);
        }

        if !EMAIL_REGEX.is_match(trimmed) || trimmed.parse::<Address>().is_err() {
            return Err(InvalidEmailAddress);
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Wraps a string without validating it, to model addresses the mail library may refuse.
    #[cfg(test)]
    pub(crate) fn unchecked(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// The address as written in the document, trimmed
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used to detect the same mailbox listed twice
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EmailAddress> for String {
    fn from(email: EmailAddress) -> Self {
        email.0
    }
}
