//! Placeholder substitution

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::FieldMap;
use crate::domain::specification::Template;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").unwrap();
}

/// Text with its placeholders substituted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendered {
    /// The substituted text
    pub text: String,

    /// Placeholders that had no field and were left as written
    pub unresolved: BTreeSet<String>,
}

/// Subject and body rendered for one recipient
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Rendered subject
    pub subject: String,

    /// Rendered body
    pub body: String,

    /// Rendered plain-text alternative of an HTML body
    pub text_body: Option<String>,

    /// Placeholders left unresolved in any part
    pub unresolved: BTreeSet<String>,
}

impl RenderedMessage {
    /// Whether every placeholder was substituted
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Replaces every `{{ key }}` placeholder in `pattern` with its value from `fields`.
///
/// Placeholders without a field are kept verbatim and reported in [`Rendered::unresolved`].
/// Substituted values are inserted as-is and never scanned again, so a value containing `{{`
/// cannot expand into further fields.
pub fn render(pattern: &str, fields: &FieldMap) -> Rendered {
    let mut unresolved = BTreeSet::new();

    let text = PLACEHOLDER
        .replace_all(pattern, |captures: &Captures<'_>| match fields.get(&captures[1]) {
            Some(value) => value.to_string(),
            None => {
                unresolved.insert(captures[1].to_string());
                captures[0].to_string()
            }
        })
        .into_owned();

    Rendered { text, unresolved }
}

/// Renders every part of a template with the same fields.
pub fn render_message(template: &Template, fields: &FieldMap) -> RenderedMessage {
    let subject = render(&template.subject, fields);
    let body = render(&template.body, fields);
    let text_body = template
        .text_body
        .as_deref()
        .map(|pattern| render(pattern, fields));

    let mut unresolved = subject.unresolved;
    unresolved.extend(body.unresolved);

    let text_body = text_body.map(|rendered| {
        unresolved.extend(rendered.unresolved);
        rendered.text
    });

    RenderedMessage {
        subject: subject.text,
        body: body.text,
        text_body,
        unresolved,
    }
}
