//! Mailing list identifier

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

lazy_static! {
    static ref LIST_ID_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)+$")
            .unwrap();
}

/// The list identifier is not a dotted label such as `news.example.com`
#[derive(Debug, Error, PartialEq, Eq)]
#[error("list id must be a dotted label such as news.example.com")]
pub struct ListIdError;

/// Identifier of the mailing list, sent as the `List-Id` header
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ListId(String);

impl ListId {
    /// Create a new list identifier
    pub fn new(raw: &str) -> Result<Self, ListIdError> {
        let trimmed = raw.trim();

        if !LIST_ID_REGEX.is_match(trimmed) {
            return Err(ListIdError);
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The identifier without angle brackets
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
