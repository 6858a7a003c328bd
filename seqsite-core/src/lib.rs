//! # seqsite-core
//!
//! Core library for the seqsite outline publisher.
//!
//! This crate discovers outline notes, parses their block trees, decides
//! which pages are public and renders them to HTML fragments with every
//! link checked against that decision.

pub mod builder;
pub mod config;
pub mod excerpt;
pub mod frontmatter;
pub mod links;
pub mod markdown;
pub mod models;
pub mod outline;
pub mod slug;

pub use builder::{BuildError, SiteBuilder};
pub use config::{Config, ConfigError, ImagesConfig};
pub use excerpt::page_excerpt;
pub use links::{LinkGraph, LinkResolver, PageLookup, Resolution};
pub use markdown::{PageRenderer, RenderedPage, RenderedProperty};
pub use models::{
    Block, Diagnostic, DiagnosticSeverity, Page, Properties, SiteIndex, TaskMarker, Visibility,
};
pub use outline::OutlineParser;
pub use slug::slugify;
