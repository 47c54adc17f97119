//! The declarative shape of a specification document.
//!
//! These types are deserialized straight from the untyped YAML tree and are also the source of
//! the exported JSON Schema, so editor tooling and the validator can never disagree about which
//! keys exist. Every mapping rejects unknown keys.

use std::{fmt, path::PathBuf};

use schemars::JsonSchema;
use serde::{
    de::{self, value::MapAccessDeserializer, MapAccess, Visitor},
    Deserialize, Deserializer,
};

use super::{ContentKind, Encryption};
use crate::domain::merge::FieldMap;

/// Root of a specification document
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(
    title = "Mailcast specification",
    description = "Recipients, a message template and delivery settings for one mail merge run"
)]
pub struct Document {
    /// Who the messages are from
    pub sender: MailboxDocument,

    /// Author shown in `From` when it is not the sender; the sender then goes in `Sender`
    pub author: Option<MailboxDocument>,

    /// Where replies should go, if not to the sender
    pub reply_to: Option<MailboxDocument>,

    /// Mailing list identifier sent as `List-Id`, e.g. `newsletter.example.com`
    pub list_id: Option<String>,

    /// How to reach the mail server
    pub transport: TransportDocument,

    /// Default substitution fields shared by every recipient
    #[serde(default)]
    pub fields: FieldMap,

    /// Subject and body patterns
    pub template: TemplateDocument,

    /// Who receives a message, in delivery order
    #[schemars(length(min = 1))]
    pub recipients: Vec<RecipientDocument>,
}

/// An address with an optional display name
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MailboxDocument {
    /// Email address
    #[schemars(email)]
    pub address: String,

    /// Display name
    pub name: Option<String>,
}

/// Mail server settings; every key has a default
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TransportDocument {
    /// Server host name (default `localhost`)
    pub host: Option<String>,

    /// Server port (default 25, 587 or 465 depending on `encryption`)
    #[schemars(range(min = 1))]
    pub port: Option<u16>,

    /// Connection security (default `starttls`)
    pub encryption: Option<Encryption>,

    /// Login, when the server requires one
    pub credentials: Option<CredentialsDocument>,

    /// Network timeout in seconds (default 60)
    #[schemars(range(min = 1))]
    pub timeout_secs: Option<u64>,
}

/// Reference to SMTP credentials; the password itself never lives in the document
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CredentialsDocument {
    /// Login name
    pub username: String,

    /// Environment variable holding the password (default `SMTP_PASSWORD`)
    pub password_env: Option<String>,
}

/// Message template
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TemplateDocument {
    /// Subject pattern
    pub subject: String,

    /// Body pattern
    pub body: String,

    /// Body content type (default `text/plain`)
    pub content_type: Option<ContentKind>,

    /// Plain-text alternative sent alongside an HTML body
    pub text_body: Option<String>,

    /// Files attached to every message
    #[serde(default)]
    pub attachments: Vec<AttachmentDocument>,
}

/// An attachment, either a bare path or a path with overrides
#[derive(Debug, Clone, JsonSchema)]
#[schemars(untagged)]
pub enum AttachmentDocument {
    /// Path to the file
    Path(PathBuf),

    /// Path to the file with an explicit name and/or content type
    Detailed(AttachmentDetails),
}

impl<'de> Deserialize<'de> for AttachmentDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AttachmentVisitor;

        impl<'de> Visitor<'de> for AttachmentVisitor {
            type Value = AttachmentDocument;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a file path or a mapping with a `path` key")
            }

            fn visit_str<E>(self, path: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(AttachmentDocument::Path(PathBuf::from(path)))
            }

            fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                AttachmentDetails::deserialize(MapAccessDeserializer::new(map))
                    .map(AttachmentDocument::Detailed)
            }
        }

        deserializer.deserialize_any(AttachmentVisitor)
    }
}

/// Attachment with overrides
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AttachmentDetails {
    /// Path to the file
    pub path: PathBuf,

    /// File name shown to the recipient (default: the file name of `path`)
    pub name: Option<String>,

    /// MIME type (default: guessed from the extension)
    pub content_type: Option<String>,
}

/// One recipient
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RecipientDocument {
    /// Email address; must be unique within the document
    #[schemars(email)]
    pub address: String,

    /// Display name used in the `To` header
    pub name: Option<String>,

    /// Substitution fields overriding the document defaults
    #[serde(default)]
    pub fields: FieldMap,
}
