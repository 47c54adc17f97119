//! Per-recipient field resolution and placeholder substitution.

pub mod fields;
pub mod template;

pub use fields::{resolve, FieldMap};
pub use template::{render, render_message, Rendered, RenderedMessage};
