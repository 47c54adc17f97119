//! Validated specification model

use std::{path::PathBuf, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{errors::SchemaError, schema, EmailAddress, ListId};
use crate::domain::merge::FieldMap;

/// Host used when the document does not name one
pub const DEFAULT_HOST: &str = "localhost";

/// Environment variable holding the SMTP password when the document does not name one
pub const DEFAULT_PASSWORD_ENV: &str = "SMTP_PASSWORD";

/// Network timeout used when the document does not set one
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// An address with an optional display name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name
    pub name: Option<String>,

    /// Email address
    pub address: EmailAddress,
}

/// Who the messages come from and the list they belong to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    /// Mailbox responsible for the transmission (`MAIL FROM`, and `Sender` when an author is set)
    pub sender: Mailbox,

    /// Author shown in `From`, when it differs from the sender
    pub author: Option<Mailbox>,

    /// Where replies should go
    pub reply_to: Option<Mailbox>,

    /// Mailing list identifier
    pub list_id: Option<ListId>,
}

/// Connection security for the mail transport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// Plain text connection
    None,

    /// Plain connection upgraded with STARTTLS
    #[default]
    Starttls,

    /// TLS from the first byte (SMTPS)
    Tls,
}

impl Encryption {
    /// The conventional port for this mode
    pub fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::Starttls => 587,
            Self::Tls => 465,
        }
    }
}

/// Where to find the SMTP login
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Login name
    pub username: String,

    /// Name of the environment variable holding the password
    pub password_env: String,
}

/// Mail transport settings with every default applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Server host name
    pub host: String,

    /// Server port
    pub port: u16,

    /// Connection security
    pub encryption: Encryption,

    /// Login, if the server requires one
    pub credentials: Option<Credentials>,

    /// Network timeout
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        let encryption = Encryption::default();

        Self {
            host: DEFAULT_HOST.to_string(),
            port: encryption.default_port(),
            encryption,
            credentials: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Body content type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ContentKind {
    /// `text/plain`
    #[default]
    #[serde(rename = "text/plain")]
    Plain,

    /// `text/html`
    #[serde(rename = "text/html")]
    Html,
}

/// A file attached to every message of the batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentSpec {
    /// Path to the file
    pub path: PathBuf,

    /// File name shown to the recipient
    pub name: Option<String>,

    /// Declared MIME type
    pub content_type: Option<String>,
}

/// Message template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    /// Subject pattern
    pub subject: String,

    /// Body pattern
    pub body: String,

    /// Plain-text alternative pattern for an HTML body
    pub text_body: Option<String>,

    /// Body content type
    pub content_kind: ContentKind,

    /// Files attached to every message
    pub attachments: Vec<AttachmentSpec>,
}

/// One target of delivery
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    address: EmailAddress,
    name: Option<String>,
    fields: FieldMap,
}

impl Recipient {
    pub(crate) fn new(address: EmailAddress, name: Option<String>, fields: FieldMap) -> Self {
        Self {
            address,
            name,
            fields,
        }
    }

    /// The recipient's address
    pub fn address(&self) -> &EmailAddress {
        &self.address
    }

    /// The recipient's display name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Fields overriding the document defaults for this recipient
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }
}

/// A validated specification for one mail merge run.
///
/// Only [`schema::validate`] builds one, so holding a `Specification` means the recipient list
/// is non-empty, every address is valid and no address is listed twice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Specification {
    origin: Origin,
    transport: TransportConfig,
    fields: FieldMap,
    template: Template,
    recipients: Vec<Recipient>,
}

impl Specification {
    pub(crate) fn new(
        origin: Origin,
        transport: TransportConfig,
        fields: FieldMap,
        template: Template,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            origin,
            transport,
            fields,
            template,
            recipients,
        }
    }

    /// Parses and validates a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|err| SchemaError::Syntax(err.to_string()))?;

        schema::validate(value)
    }

    /// Originator headers
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Who the messages are from
    pub fn sender(&self) -> &Mailbox {
        &self.origin.sender
    }

    /// Where replies should go
    pub fn reply_to(&self) -> Option<&Mailbox> {
        self.origin.reply_to.as_ref()
    }

    /// Mail transport settings
    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Default substitution fields
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Message template
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Recipients in delivery order
    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }
}
