#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Mail merge library: validates a mailing specification, renders one message per recipient
//! and drives their delivery over a mail transport.

pub mod domain;
pub mod infrastructure;
