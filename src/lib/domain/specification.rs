//! Mailing specification: the declarative document shape, its validator and the validated model.

mod document;
mod email_address;
mod list_id;
mod model;

pub mod errors;
pub mod schema;

pub use document::{
    AttachmentDetails, AttachmentDocument, CredentialsDocument, Document, MailboxDocument,
    RecipientDocument, TemplateDocument, TransportDocument,
};
pub use email_address::{EmailAddress, EmailAddressError};
pub use errors::SchemaError;
pub use list_id::{ListId, ListIdError};
pub use model::{
    AttachmentSpec, ContentKind, Credentials, Encryption, Mailbox, Origin, Recipient,
    Specification, Template, TransportConfig, DEFAULT_HOST, DEFAULT_PASSWORD_ENV,
    DEFAULT_TIMEOUT_SECS,
};
