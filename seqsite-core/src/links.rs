//! Page references, title lookup and link resolution.
//!
//! The lookup is built once after discovery and shared read-only by the
//! renderer. Resolving a reference never touches the pages themselves.

use crate::models::{Diagnostic, Page};
use crate::slug::normalize_title;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

static PAGE_REF: OnceLock<Regex> = OnceLock::new();
static CODE_SPAN: OnceLock<Regex> = OnceLock::new();

fn page_ref_regex() -> &'static Regex {
    PAGE_REF.get_or_init(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap())
}

pub(crate) fn code_span_regex() -> &'static Regex {
    CODE_SPAN.get_or_init(|| Regex::new(r"(?s)```.*?```|`[^`\n]*`").unwrap())
}

/// A `[[Target]]` or `[[Target|label]]` occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub target: String,
    pub label: Option<String>,
}

impl PageRef {
    /// Parse the text between `[[` and `]]`
    pub fn parse(inner: &str) -> Option<Self> {
        let (target, label) = match inner.split_once('|') {
            Some((target, label)) => (target.trim(), Some(label.trim())),
            None => (inner.trim(), None),
        };
        if target.is_empty() {
            return None;
        }
        Some(Self {
            target: target.to_string(),
            label: label.filter(|l| !l.is_empty()).map(str::to_string),
        })
    }

    /// Text shown for the reference
    pub fn text(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.target)
    }
}

/// All page references in a piece of block text, skipping code
pub fn extract_page_refs(text: &str) -> Vec<PageRef> {
    let without_code = code_span_regex().replace_all(text, "");
    page_ref_regex()
        .captures_iter(&without_code)
        .filter_map(|c| c.get(1).and_then(|m| PageRef::parse(m.as_str())))
        .collect()
}

/// Strip `[[...]]` markers, keeping the reference text
pub fn strip_page_refs(text: &str) -> String {
    page_ref_regex()
        .replace_all(text, |caps: &regex::Captures| {
            PageRef::parse(&caps[1])
                .map(|r| r.text().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

/// Normalized title (and alias) -> page index
#[derive(Debug, Clone, Default)]
pub struct PageLookup {
    by_title: HashMap<String, usize>,
}

impl PageLookup {
    /// Build the lookup. On a collision the earlier page (pages are sorted
    /// by path) keeps the title and a diagnostic is returned.
    pub fn build(pages: &[Page]) -> (Self, Vec<Diagnostic>) {
        let mut by_title: HashMap<String, usize> = HashMap::new();
        let mut diagnostics = Vec::new();

        for (idx, page) in pages.iter().enumerate() {
            let key = normalize_title(&page.title);
            if let Some(&existing) = by_title.get(&key) {
                diagnostics.push(Diagnostic::warning(
                    "title.duplicate",
                    format!(
                        "Title '{}' is already used by {}; links resolve to that page",
                        page.title,
                        pages[existing].source_path.display()
                    ),
                    Some(&page.source_path),
                ));
                continue;
            }
            by_title.insert(key, idx);
        }

        for (idx, page) in pages.iter().enumerate() {
            for alias in &page.aliases {
                let key = normalize_title(alias);
                match by_title.get(&key) {
                    Some(&existing) if existing != idx => {
                        diagnostics.push(Diagnostic::warning(
                            "alias.duplicate",
                            format!(
                                "Alias '{}' conflicts with {}",
                                alias,
                                pages[existing].source_path.display()
                            ),
                            Some(&page.source_path),
                        ));
                    }
                    Some(_) => {}
                    None => {
                        by_title.insert(key, idx);
                    }
                }
            }
        }

        (Self { by_title }, diagnostics)
    }

    pub fn find(&self, title: &str) -> Option<usize> {
        self.by_title.get(&normalize_title(title)).copied()
    }
}

/// Outcome of resolving a reference.
///
/// `Private` deliberately carries nothing from the target page.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Public(&'a Page),
    Private,
    Unresolved,
}

/// Resolves references against the complete page set
#[derive(Debug, Clone, Copy)]
pub struct LinkResolver<'a> {
    pages: &'a [Page],
    lookup: &'a PageLookup,
}

impl<'a> LinkResolver<'a> {
    pub fn new(pages: &'a [Page], lookup: &'a PageLookup) -> Self {
        Self { pages, lookup }
    }

    pub fn resolve(&self, target: &str) -> Resolution<'a> {
        match self.lookup.find(target).and_then(|idx| self.pages.get(idx)) {
            Some(page) if page.is_public() => Resolution::Public(page),
            Some(_) => Resolution::Private,
            None => Resolution::Unresolved,
        }
    }
}

/// Relative href from one output page to another
pub fn relative_href(from: &Page, to: &Page) -> String {
    format!("{}{}", from.root_prefix(), to.output_path)
}

/// Page-to-page reference graph (indices into the page list)
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    incoming: BTreeMap<usize, BTreeSet<usize>>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from every reference in page properties and block text
    pub fn build(pages: &[Page], lookup: &PageLookup) -> Self {
        let mut graph = Self::new();
        for (source, page) in pages.iter().enumerate() {
            let property_refs = page.properties.iter().flat_map(|p| extract_page_refs(&p.value));
            let block_refs = page.all_blocks().into_iter().flat_map(|b| {
                let mut refs = extract_page_refs(&b.text);
                refs.extend(b.properties.iter().flat_map(|p| extract_page_refs(&p.value)));
                refs
            });
            for page_ref in property_refs.chain(block_refs) {
                if let Some(target) = lookup.find(&page_ref.target) {
                    graph.add_link(source, target);
                }
            }
        }
        graph
    }

    pub fn add_link(&mut self, source: usize, target: usize) {
        self.incoming.entry(target).or_default().insert(source);
    }

    pub fn backlinks(&self, target: usize) -> Vec<usize> {
        self.incoming
            .get(&target)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
}
