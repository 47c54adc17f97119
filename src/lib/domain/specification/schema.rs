//! Schema validation of raw specification documents

use std::{collections::HashMap, time::Duration};

use schemars::{schema::RootSchema, schema_for};
use serde_yaml::Value;
use tracing::debug;

use super::{
    AttachmentDocument, AttachmentSpec, ContentKind, Credentials, Document, EmailAddress, ListId,
    Mailbox, MailboxDocument, Origin, Recipient, SchemaError, Specification, Template,
    TransportConfig, TransportDocument, DEFAULT_HOST, DEFAULT_PASSWORD_ENV, DEFAULT_TIMEOUT_SECS,
};

/// Validates an untyped document tree and builds the [`Specification`] it describes.
///
/// # Arguments
/// * `document` - The parsed, untyped document.
///
/// # Returns
/// - [`Ok`] with the validated [`Specification`].
/// - [`Err`] with a [`SchemaError`] naming the first offending path.
pub fn validate(document: Value) -> Result<Specification, SchemaError> {
    let document: Document =
        serde_path_to_error::deserialize(document).map_err(|err| SchemaError::Shape {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        })?;

    let origin = origin(&document)?;
    let transport = transport(&document.transport)?;
    let template = template(&document)?;
    let recipients = recipients(&document)?;

    debug!(recipients = recipients.len(), "specification is valid");

    Ok(Specification::new(
        origin,
        transport,
        document.fields,
        template,
        recipients,
    ))
}

/// The JSON Schema of a specification document, for editor tooling.
pub fn json_schema() -> RootSchema {
    schema_for!(Document)
}

fn address(raw: &str, path: impl Into<String>) -> Result<EmailAddress, SchemaError> {
    EmailAddress::new(raw).map_err(|source| SchemaError::InvalidAddress {
        path: path.into(),
        address: raw.to_string(),
        source,
    })
}

fn mailbox(document: &MailboxDocument, path: &str) -> Result<Mailbox, SchemaError> {
    Ok(Mailbox {
        name: document.name.clone(),
        address: address(&document.address, path)?,
    })
}

fn optional_mailbox(
    document: Option<&MailboxDocument>,
    path: &str,
) -> Result<Option<Mailbox>, SchemaError> {
    document.map(|document| mailbox(document, path)).transpose()
}

fn origin(document: &Document) -> Result<Origin, SchemaError> {
    let list_id = document
        .list_id
        .as_deref()
        .map(|raw| {
            ListId::new(raw).map_err(|source| SchemaError::InvalidListId {
                value: raw.to_string(),
                source,
            })
        })
        .transpose()?;

    Ok(Origin {
        sender: mailbox(&document.sender, "sender.address")?,
        author: optional_mailbox(document.author.as_ref(), "author.address")?,
        reply_to: optional_mailbox(document.reply_to.as_ref(), "reply_to.address")?,
        list_id,
    })
}

fn transport(document: &TransportDocument) -> Result<TransportConfig, SchemaError> {
    let encryption = document.encryption.unwrap_or_default();
    let port = document.port.unwrap_or_else(|| encryption.default_port());

    if port == 0 {
        return Err(SchemaError::InvalidPort { port });
    }

    let timeout_secs = document.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(SchemaError::InvalidTimeout { secs: timeout_secs });
    }

    let credentials = document.credentials.as_ref().map(|credentials| Credentials {
        username: credentials.username.clone(),
        password_env: credentials
            .password_env
            .clone()
            .unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string()),
    });

    Ok(TransportConfig {
        host: document
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port,
        encryption,
        credentials,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn template(document: &Document) -> Result<Template, SchemaError> {
    let content_kind = document.template.content_type.unwrap_or_default();

    if document.template.text_body.is_some() && content_kind != ContentKind::Html {
        return Err(SchemaError::TextBodyWithoutHtml);
    }

    let attachments = document
        .template
        .attachments
        .iter()
        .map(|attachment| match attachment {
            AttachmentDocument::Path(path) => AttachmentSpec {
                path: path.clone(),
                name: None,
                content_type: None,
            },
            AttachmentDocument::Detailed(details) => AttachmentSpec {
                path: details.path.clone(),
                name: details.name.clone(),
                content_type: details.content_type.clone(),
            },
        })
        .collect();

    Ok(Template {
        subject: document.template.subject.clone(),
        body: document.template.body.clone(),
        text_body: document.template.text_body.clone(),
        content_kind,
        attachments,
    })
}

fn recipients(document: &Document) -> Result<Vec<Recipient>, SchemaError> {
    if document.recipients.is_empty() {
        return Err(SchemaError::NoRecipients);
    }

    let mut seen: HashMap<String, usize> = HashMap::with_capacity(document.recipients.len());
    let mut recipients = Vec::with_capacity(document.recipients.len());

    for (index, recipient) in document.recipients.iter().enumerate() {
        let path = format!("recipients[{index}].address");
        let email = address(&recipient.address, path.clone())?;

        if let Some(first) = seen.insert(email.normalized(), index) {
            return Err(SchemaError::DuplicateRecipient {
                path,
                address: email.to_string(),
                first,
            });
        }

        recipients.push(Recipient::new(
            email,
            recipient.name.clone(),
            recipient.fields.clone(),
        ));
    }

    Ok(recipients)
}
