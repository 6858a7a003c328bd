//! # seqsite-render
//!
//! Template rendering library for seqsite.
//!
//! This crate handles HTML page and index rendering using Askama.

pub mod templates;

pub use templates::{
    IndexEntry, IndexTemplate, PageLinkEntry, PageTemplate, PropertyEntry, RenderError,
};
