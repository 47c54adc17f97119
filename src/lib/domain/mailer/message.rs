//! Transport-ready messages

use std::error::Error as StdError;

use lettre::{
    address::Envelope,
    message::{
        header::{Header, HeaderName, HeaderValue},
        Mailbox as MailboxHeader, MultiPart, SinglePart,
    },
    Address, Message,
};

use super::{Attachments, BuildError};
use crate::domain::{
    merge::RenderedMessage,
    specification::{ContentKind, EmailAddress, ListId, Mailbox, Recipient, Specification},
};

/// A fully addressed message, ready to hand to a transport session
#[derive(Clone, Debug)]
pub struct TransportMessage {
    /// The recipient the message was built for
    recipient: EmailAddress,

    /// The assembled message
    message: Message,
}

impl TransportMessage {
    /// The recipient the message was built for
    pub fn recipient(&self) -> &EmailAddress {
        &self.recipient
    }

    /// The assembled message
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// SMTP envelope (`MAIL FROM` / `RCPT TO`)
    pub fn envelope(&self) -> &Envelope {
        self.message.envelope()
    }

    /// The message in wire format
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

/// `List-Id` header (RFC 2919)
#[derive(Clone, Debug, PartialEq, Eq)]
struct ListIdHeader(String);

impl Header for ListIdHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Id")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let id = s
            .rsplit_once('<')
            .and_then(|(_, rest)| rest.strip_suffix('>'))
            .unwrap_or(s);

        Ok(Self(id.trim().to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), format!("<{}>", self.0))
    }
}

impl From<&ListId> for ListIdHeader {
    fn from(list_id: &ListId) -> Self {
        Self(list_id.as_str().to_string())
    }
}

/// Builds one [`TransportMessage`] per recipient from the document-level parts of a
/// specification
#[derive(Debug)]
pub struct MessageBuilder<'a> {
    from: MailboxHeader,
    sender: Option<MailboxHeader>,
    reply_to: Option<MailboxHeader>,
    list_id: Option<ListIdHeader>,
    content_kind: ContentKind,
    attachments: &'a Attachments,
}

impl<'a> MessageBuilder<'a> {
    /// Prepares the headers and attachments shared by every message.
    ///
    /// When the document names an author, the author goes in `From` and the sender in
    /// `Sender`. Fails if an originator address is refused by the mail library, which affects
    /// every message of the batch.
    pub fn new(spec: &Specification, attachments: &'a Attachments) -> Result<Self, BuildError> {
        let origin = spec.origin();

        let (from, sender) = match &origin.author {
            Some(author) => (mailbox(author)?, Some(mailbox(&origin.sender)?)),
            None => (mailbox(&origin.sender)?, None),
        };

        Ok(Self {
            from,
            sender,
            reply_to: origin.reply_to.as_ref().map(mailbox).transpose()?,
            list_id: origin.list_id.as_ref().map(ListIdHeader::from),
            content_kind: spec.template().content_kind,
            attachments,
        })
    }

    /// Assembles the message for one recipient from their rendered subject and body.
    pub fn build(
        &self,
        recipient: &Recipient,
        rendered: RenderedMessage,
    ) -> Result<TransportMessage, BuildError> {
        let RenderedMessage {
            subject,
            body,
            text_body,
            ..
        } = rendered;

        let to = MailboxHeader::new(
            recipient.name().map(str::to_string),
            address(recipient.address())?,
        );

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .message_id(None)
            .date_now();

        if let Some(sender) = &self.sender {
            builder = builder.sender(sender.clone());
        }

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }

        if let Some(list_id) = &self.list_id {
            builder = builder.header(list_id.clone());
        }

        let message = match (self.content_kind, text_body) {
            (ContentKind::Html, Some(text)) => {
                let alternative = MultiPart::alternative_plain_html(text, body);

                if self.attachments.is_empty() {
                    builder.multipart(alternative)?
                } else {
                    builder.multipart(self.attach(MultiPart::mixed().multipart(alternative)))?
                }
            }
            (kind, _) => {
                let part = match kind {
                    ContentKind::Plain => SinglePart::plain(body),
                    ContentKind::Html => SinglePart::html(body),
                };

                if self.attachments.is_empty() {
                    builder.singlepart(part)?
                } else {
                    builder.multipart(self.attach(MultiPart::mixed().singlepart(part)))?
                }
            }
        };

        Ok(TransportMessage {
            recipient: recipient.address().clone(),
            message,
        })
    }

    fn attach(&self, multipart: MultiPart) -> MultiPart {
        self.attachments
            .parts()
            .fold(multipart, MultiPart::singlepart)
    }
}

fn address(email: &EmailAddress) -> Result<Address, BuildError> {
    email
        .as_str()
        .parse()
        .map_err(|source| BuildError::InvalidAddress {
            address: email.to_string(),
            source,
        })
}

fn mailbox(mailbox: &Mailbox) -> Result<MailboxHeader, BuildError> {
    Ok(MailboxHeader::new(
        mailbox.name.clone(),
        address(&mailbox.address)?,
    ))
}
