//! Attachments shared by every message of a batch

use std::{fs, path::Path, sync::Arc};

use lettre::message::{header::ContentType, Attachment, Body, SinglePart};
use tracing::debug;

use super::BuildError;
use crate::domain::specification::AttachmentSpec;

/// One attachment, read and encoded once
#[derive(Clone, Debug)]
pub struct LoadedAttachment {
    filename: String,
    content_type: ContentType,
    body: Body,
}

impl LoadedAttachment {
    /// Reads an attachment from disk.
    ///
    /// The file name defaults to the last component of the path and the content type to a
    /// guess from its extension.
    pub fn load(spec: &AttachmentSpec) -> Result<Self, BuildError> {
        let bytes = fs::read(&spec.path).map_err(|source| BuildError::Attachment {
            path: spec.path.clone(),
            source,
        })?;

        let declared = match &spec.content_type {
            Some(declared) => declared.clone(),
            None => mime_guess::from_path(&spec.path)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        let content_type =
            ContentType::parse(&declared).map_err(|_| BuildError::ContentType {
                path: spec.path.clone(),
                content_type: declared.clone(),
            })?;

        let filename = spec
            .name
            .clone()
            .unwrap_or_else(|| file_name(&spec.path));

        debug!(
            filename = %filename,
            size = bytes.len(),
            content_type = %declared,
            "loaded attachment"
        );

        Ok(Self {
            filename,
            content_type,
            body: Body::new(bytes),
        })
    }

    /// File name shown to the recipient
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type of the attachment
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    fn part(&self) -> SinglePart {
        Attachment::new(self.filename.clone()).body(self.body.clone(), self.content_type.clone())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string())
}

/// Every attachment of a batch, loaded once and shared by reference between messages
#[derive(Clone, Debug, Default)]
pub struct Attachments(Arc<[LoadedAttachment]>);

impl Attachments {
    /// Loads all attachments declared by a template, failing on the first unreadable one
    pub fn load(specs: &[AttachmentSpec]) -> Result<Self, BuildError> {
        let loaded = specs
            .iter()
            .map(LoadedAttachment::load)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(loaded.into()))
    }

    /// Number of attachments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attachments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attachments in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &LoadedAttachment> {
        self.0.iter()
    }

    pub(crate) fn parts(&self) -> impl Iterator<Item = SinglePart> + '_ {
        self.0.iter().map(LoadedAttachment::part)
    }
}
