//! Mailer errors

use std::{io, path::PathBuf};

use lettre::address::AddressError;
use thiserror::Error;

/// Errors that can occur while assembling a message
#[derive(Debug, Error)]
pub enum BuildError {
    /// An attachment file could not be read
    #[error("could not read attachment {}: {source}", .path.display())]
    Attachment {
        /// The attachment path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// An attachment declares a content type that cannot be parsed
    #[error("attachment {} has an invalid content type {content_type:?}", .path.display())]
    ContentType {
        /// The attachment path
        path: PathBuf,
        /// The declared content type
        content_type: String,
    },

    /// The mail library refused an address
    #[error("invalid address {address}: {source}")]
    InvalidAddress {
        /// The refused address
        address: String,
        /// Why it was refused
        #[source]
        source: AddressError,
    },

    /// The message could not be assembled
    #[error("could not assemble message: {0}")]
    Message(#[from] lettre::error::Error),
}

/// Errors that make a transport session unusable
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server could not be reached
    #[error("could not connect to {host}:{port}: {reason}")]
    Connect {
        /// Server host
        host: String,
        /// Server port
        port: u16,
        /// Why the connection failed
        reason: String,
    },

    /// The server refused the login
    #[error("authentication as {username} failed: {reason}")]
    Authentication {
        /// Login name
        username: String,
        /// Server response
        reason: String,
    },

    /// The password environment variable is not set
    #[error("environment variable {0} holding the SMTP password is not set")]
    MissingPassword(String),

    /// The connection broke while sending
    #[error("transport session broke: {0}")]
    Broken(String),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors that can occur when sending one message
#[derive(Debug, Error)]
pub enum SendError {
    /// The server refused this message; the session is still usable
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The session failed; nothing more can be sent on it
    #[error(transparent)]
    Session(#[from] SessionError),
}
