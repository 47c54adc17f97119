//! Errors raised while validating a specification document

use thiserror::Error;

use super::{EmailAddressError, ListIdError};

/// The document does not match the specification shape.
///
/// Every variant names the offending location so that a typo in a key or a bad value can be
/// fixed without guessing. No message is sent once any of these has been raised.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The text could not be parsed as YAML (includes duplicated mapping keys)
    #[error("document is not well-formed YAML: {0}")]
    Syntax(String),

    /// A key is missing, unknown, or holds a value of the wrong type
    #[error("{path}: {message}")]
    Shape {
        /// Location of the offending value, e.g. `recipients[1].fields`
        path: String,
        /// What was expected there
        message: String,
    },

    /// The recipient list is empty
    #[error("recipients: at least one recipient is required")]
    NoRecipients,

    /// An address is not a syntactically valid email address
    #[error("{path}: {address:?} is not a valid email address ({source})")]
    InvalidAddress {
        /// Location of the address
        path: String,
        /// The address as written
        address: String,
        /// Why it was rejected
        #[source]
        source: EmailAddressError,
    },

    /// The transport port is zero
    #[error("transport.port: expected a positive integer, got {port}")]
    InvalidPort {
        /// The rejected port
        port: u16,
    },

    /// The transport timeout is zero
    #[error("transport.timeout_secs: expected a positive integer, got {secs}")]
    InvalidTimeout {
        /// The rejected timeout
        secs: u64,
    },

    /// The list identifier is not a dotted label
    #[error("list_id: {value:?} is not a valid list id ({source})")]
    InvalidListId {
        /// The identifier as written
        value: String,
        /// Why it was rejected
        #[source]
        source: ListIdError,
    },

    /// A plain-text alternative was given for a plain-text body
    #[error("template.text_body: only allowed when template.content_type is text/html")]
    TextBodyWithoutHtml,

    /// The same recipient address is listed more than once
    #[error("{path}: duplicate recipient address {address}, already listed at recipients[{first}]")]
    DuplicateRecipient {
        /// Location of the second occurrence
        path: String,
        /// The duplicated address
        address: String,
        /// Index of the first occurrence
        first: usize,
    },
}
