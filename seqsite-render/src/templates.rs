//! Askama template definitions.

use askama::Template;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Template rendering failed: {0}")]
    Template(#[from] askama::Error),
}

/// A link to another published page
#[derive(Debug, Clone)]
pub struct PageLinkEntry {
    pub url: String,
    pub title: String,
}

/// A page property shown in the properties panel
#[derive(Debug, Clone)]
pub struct PropertyEntry {
    pub key: String,
    /// Already rendered, links resolved
    pub value_html: String,
}

/// One row of the index page
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub url: String,
    /// Last namespace segment of the title
    pub title: String,
    /// Parent namespace, if any
    pub parent: Option<String>,
    pub excerpt: Option<String>,
}

/// Single page template
#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate {
    pub title: String,
    pub properties: Vec<PropertyEntry>,

    /// Rendered block tree
    pub content: String,

    /// Public namespace children
    pub children: Vec<PageLinkEntry>,
    /// Public pages linking here
    pub backlinks: Vec<PageLinkEntry>,

    pub site_title: String,

    // Path adjustments (for nested pages)
    pub css_path: String,
    pub index_path: String,
}

/// Index page template
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub site_title: String,
    pub site_description: String,
    pub entries: Vec<IndexEntry>,
    pub css_path: String,
}

impl PageTemplate {
    pub fn to_html(&self) -> Result<String, RenderError> {
        Ok(self.render()?)
    }
}

impl IndexTemplate {
    pub fn to_html(&self) -> Result<String, RenderError> {
        Ok(self.render()?)
    }
}
