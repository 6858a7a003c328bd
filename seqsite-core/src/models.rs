//! Content model structs for pages, blocks, diagnostics and the site index.

use crate::links::{LinkGraph, PageLookup};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Whether a page is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// The raw `public::` declaration of a page, before namespace inheritance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicFlag {
    /// `public:: true`
    Page,
    /// `public:: children` - the page and its namespace children
    WithChildren,
    /// Any other value
    Denied,
    /// No `public::` property at all
    Missing,
}

impl PublicFlag {
    pub fn from_value(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return PublicFlag::Missing;
        };
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" => PublicFlag::Page,
            "children" => PublicFlag::WithChildren,
            _ => PublicFlag::Denied,
        }
    }
}

/// A single `key:: value` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

/// Ordered property list; keys compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties(Vec<Property>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, replacing an earlier value for the same key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(existing) = self
            .0
            .iter_mut()
            .find(|p| p.key.eq_ignore_ascii_case(&key))
        {
            existing.value = value;
        } else {
            self.0.push(Property { key, value });
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(key))
            .map(|p| p.value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Logseq task keyword at the start of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMarker {
    Todo,
    Doing,
    Done,
    Now,
    Later,
    Waiting,
    Canceled,
}

impl TaskMarker {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "TODO" => Some(TaskMarker::Todo),
            "DOING" => Some(TaskMarker::Doing),
            "DONE" => Some(TaskMarker::Done),
            "NOW" => Some(TaskMarker::Now),
            "LATER" => Some(TaskMarker::Later),
            "WAITING" => Some(TaskMarker::Waiting),
            "CANCELED" | "CANCELLED" => Some(TaskMarker::Canceled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMarker::Todo => "todo",
            TaskMarker::Doing => "doing",
            TaskMarker::Done => "done",
            TaskMarker::Now => "now",
            TaskMarker::Later => "later",
            TaskMarker::Waiting => "waiting",
            TaskMarker::Canceled => "canceled",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            TaskMarker::Todo => "☐",
            TaskMarker::Doing => "⏳",
            TaskMarker::Done => "☑️",
            TaskMarker::Now => "▶️",
            TaskMarker::Later => "⏰",
            TaskMarker::Waiting => "⌛",
            TaskMarker::Canceled => "✖",
        }
    }
}

/// One outline bullet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Markdown text with heading hashes, task keyword and properties removed
    pub text: String,

    /// Nesting depth; children are always exactly one level deeper
    pub depth: usize,

    pub heading: Option<u8>,

    pub marker: Option<TaskMarker>,

    pub properties: Properties,

    pub children: Vec<Block>,
}

impl Block {
    pub fn new(text: impl Into<String>, depth: usize) -> Self {
        Self {
            text: text.into(),
            depth,
            heading: None,
            marker: None,
            properties: Properties::new(),
            children: Vec::new(),
        }
    }

    /// Depth-first iterator over this block and all descendants
    pub fn walk(&self) -> Vec<&Block> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }
}

/// A single outline file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Source path relative to the input root
    pub source_path: PathBuf,

    /// Output path relative to the output root (`/`-separated)
    pub output_path: String,

    pub title: String,

    pub aliases: Vec<String>,

    pub properties: Properties,

    pub visibility: Visibility,

    /// Set for daily journal pages
    pub journal_date: Option<NaiveDate>,

    pub blocks: Vec<Block>,
}

impl Page {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Last namespace segment of the title (`Campaign/Session 1` -> `Session 1`)
    pub fn display_title(&self) -> &str {
        self.title.rsplit('/').next().unwrap_or(&self.title)
    }

    /// Namespace prefix of the title, if any
    pub fn namespace(&self) -> Option<&str> {
        self.title.rsplit_once('/').map(|(parent, _)| parent)
    }

    /// Number of directories between the output root and this page
    pub fn output_depth(&self) -> usize {
        self.output_path.matches('/').count()
    }

    /// Prefix that leads from this page back to the output root
    pub fn root_prefix(&self) -> String {
        "../".repeat(self.output_depth())
    }

    /// All blocks of the page in document order
    pub fn all_blocks(&self) -> Vec<&Block> {
        self.blocks.iter().flat_map(|b| b.walk()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
}

/// A non-fatal problem found while building the site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
    pub severity: DiagnosticSeverity,
    pub source_path: Option<String>,
}

impl Diagnostic {
    pub fn warning(code: &str, message: impl Into<String>, source: Option<&PathBuf>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: DiagnosticSeverity::Warning,
            source_path: source.map(|p| p.to_string_lossy().replace('\\', "/")),
        }
    }

    pub fn error(code: &str, message: impl Into<String>, source: Option<&PathBuf>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            ..Self::warning(code, message, source)
        }
    }
}

/// Complete site index: every discovered page plus lookup structures
#[derive(Debug, Clone)]
pub struct SiteIndex {
    /// All pages, sorted by source path
    pub pages: Vec<Page>,

    pub lookup: PageLookup,

    pub graph: LinkGraph,

    /// Asset file name -> absolute source path
    pub assets: BTreeMap<String, PathBuf>,

    pub diagnostics: Vec<Diagnostic>,
}

impl SiteIndex {
    /// Public pages, sorted by title (case-insensitive)
    pub fn public_pages(&self) -> Vec<&Page> {
        let mut pages: Vec<&Page> = self.pages.iter().filter(|p| p.is_public()).collect();
        pages.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.source_path.cmp(&b.source_path))
        });
        pages
    }

    /// Public pages nested directly or indirectly under `page`'s namespace
    pub fn public_children(&self, page: &Page) -> Vec<&Page> {
        let prefix = format!("{}/", page.title.to_lowercase());
        self.public_pages()
            .into_iter()
            .filter(|p| p.title.to_lowercase().starts_with(&prefix))
            .collect()
    }

    /// Public pages that link to `page`
    pub fn public_backlinks(&self, page: &Page) -> Vec<&Page> {
        let Some(target) = self.pages.iter().position(|p| p.source_path == page.source_path)
        else {
            return Vec::new();
        };
        let mut sources: Vec<&Page> = self
            .graph
            .backlinks(target)
            .into_iter()
            .filter_map(|idx| self.pages.get(idx))
            .filter(|p| p.is_public() && p.source_path != page.source_path)
            .collect();
        sources.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        sources
    }

    /// Diagnostics that must stop a build from publishing
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Page> {
        self.lookup.find(title).and_then(|idx| self.pages.get(idx))
    }
}
