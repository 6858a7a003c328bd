//! Site building logic - discovery, parsing, visibility and link indexing.

use crate::{
    config::Config,
    links::{extract_page_refs, LinkGraph, PageLookup},
    models::*,
    outline::OutlineParser,
    slug::{decode_file_stem, normalize_title, slugify},
};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Output names the writer produces itself
const RESERVED_OUTPUTS: &[&str] = &["index.html", "styles.css"];

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Cannot read input directory {path:?}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input path {0:?} is not a directory")]
    NotADirectory(PathBuf),
}

/// Main site builder
pub struct SiteBuilder {
    config: Config,
    parser: OutlineParser,
}

impl SiteBuilder {
    pub fn new(config: Config) -> Self {
        let parser = OutlineParser::new(config.indent_width)
            .with_hidden_properties(&config.hidden_properties);
        Self { config, parser }
    }

    /// Discover, parse and index every page under the input root
    pub fn build(&self) -> Result<SiteIndex, BuildError> {
        let root = self.config.input_dir();
        if !root.is_dir() {
            if let Err(source) = fs::metadata(&root) {
                return Err(BuildError::InputUnreadable { path: root, source });
            }
            return Err(BuildError::NotADirectory(root));
        }
        fs::read_dir(&root).map_err(|source| BuildError::InputUnreadable {
            path: root.clone(),
            source,
        })?;

        let files = self.discover_outline_files(&root);
        tracing::info!("Found {} outline files", files.len());

        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut pages = Vec::new();
        let mut flags = Vec::new();

        for rel_path in files {
            match fs::read(root.join(&rel_path)) {
                Ok(bytes) => {
                    let content = String::from_utf8_lossy(&bytes);
                    if let Cow::Owned(_) = content {
                        diagnostics.push(Diagnostic::warning(
                            "page.encoding",
                            "File is not valid UTF-8; invalid bytes were replaced",
                            Some(&rel_path),
                        ));
                    }
                    let (page, flag) = self.parse_page(&rel_path, &content, &mut diagnostics);
                    pages.push(page);
                    flags.push(flag);
                }
                Err(err) => {
                    tracing::error!("Failed to read {:?}: {}", rel_path, err);
                    diagnostics.push(Diagnostic::error(
                        "page.unreadable",
                        format!("Cannot read file: {err}"),
                        Some(&rel_path),
                    ));
                }
            }
        }

        apply_namespace_visibility(&mut pages, &flags);
        diagnostics.extend(claim_output_paths(&mut pages));

        let (lookup, lookup_diags) = PageLookup::build(&pages);
        diagnostics.extend(lookup_diags);
        diagnostics.extend(unresolved_link_diagnostics(&pages, &lookup));

        let graph = LinkGraph::build(&pages, &lookup);
        let assets = discover_assets(&root);

        for diag in &diagnostics {
            match diag.severity {
                DiagnosticSeverity::Error => tracing::error!("{}: {}", diag.code, diag.message),
                DiagnosticSeverity::Warning => tracing::warn!("{}: {}", diag.code, diag.message),
                DiagnosticSeverity::Info => tracing::debug!("{}: {}", diag.code, diag.message),
            }
        }

        let public_count = pages.iter().filter(|p| p.is_public()).count();
        tracing::info!(
            "Indexed {} pages ({} public, {} private)",
            pages.len(),
            public_count,
            pages.len() - public_count
        );

        Ok(SiteIndex {
            pages,
            lookup,
            graph,
            assets,
            diagnostics,
        })
    }

    /// Outline files under the root, relative and sorted
    fn discover_outline_files(&self, root: &Path) -> Vec<PathBuf> {
        let ignore_patterns = compile_ignore_patterns(&self.config.ignore_patterns);
        let mut files = Vec::new();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("Skipping unreadable entry: {}", err);
                None
            }
        }) {
            // Symlinks are kept so a dangling one surfaces as a read error
            if entry.file_type().is_dir()
                || entry.path().extension().and_then(|e| e.to_str()) != Some("md")
            {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if should_ignore(&rel_str, &ignore_patterns) {
                tracing::debug!("Ignoring {} due to ignore_patterns", rel_str);
                continue;
            }
            files.push(rel.to_path_buf());
        }

        files.sort();
        files
    }

    /// Parse a single outline file into a Page
    fn parse_page(
        &self,
        rel_path: &Path,
        content: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (Page, PublicFlag) {
        let outline = self.parser.parse(content);
        for problem in &outline.problems {
            diagnostics.push(Diagnostic::warning(
                "page.frontmatter",
                problem.clone(),
                Some(&rel_path.to_path_buf()),
            ));
        }

        let stem = rel_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let journal_date = journal_date(rel_path, stem);

        let title = match outline.properties.get("title").map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => match journal_date {
                Some(date) => journal_title(date),
                None => decode_file_stem(stem),
            },
        };

        let aliases = outline
            .properties
            .get("alias")
            .map(parse_list_property)
            .unwrap_or_default();

        let flag = PublicFlag::from_value(outline.properties.get("public"));
        let visibility = match flag {
            PublicFlag::Page | PublicFlag::WithChildren => Visibility::Public,
            PublicFlag::Denied | PublicFlag::Missing => Visibility::Private,
        };

        let page = Page {
            source_path: rel_path.to_path_buf(),
            output_path: output_path_for(rel_path),
            title,
            aliases,
            properties: outline.properties,
            visibility,
            journal_date,
            blocks: outline.blocks,
        };
        (page, flag)
    }
}

/// Pages without their own `public::` inherit from a `public:: children`
/// ancestor namespace.
fn apply_namespace_visibility(pages: &mut [Page], flags: &[PublicFlag]) {
    let sharing: HashSet<String> = pages
        .iter()
        .zip(flags)
        .filter(|(_, flag)| **flag == PublicFlag::WithChildren)
        .map(|(page, _)| normalize_title(&page.title))
        .collect();
    if sharing.is_empty() {
        return;
    }

    for (page, flag) in pages.iter_mut().zip(flags) {
        if *flag != PublicFlag::Missing {
            continue;
        }
        let title = normalize_title(&page.title);
        let inherits = title
            .match_indices('/')
            .any(|(idx, _)| sharing.contains(&title[..idx]));
        if inherits {
            tracing::debug!("{} is public through its namespace", page.title);
            page.visibility = Visibility::Public;
        }
    }
}

/// Give each public page its output path; pages that collide are demoted
/// to private so that nothing links to a file that is not written.
fn claim_output_paths(pages: &mut [Page]) -> Vec<Diagnostic> {
    let mut claimed: HashSet<String> = RESERVED_OUTPUTS.iter().map(|s| s.to_string()).collect();
    let mut diagnostics = Vec::new();

    for page in pages.iter_mut().filter(|p| p.is_public()) {
        let path = page.output_path.clone();
        if path.starts_with("assets/") || !claimed.insert(path.clone()) {
            diagnostics.push(Diagnostic::warning(
                "output.collision",
                format!("Output path {path} is already taken; page not published"),
                Some(&page.source_path),
            ));
            page.visibility = Visibility::Private;
        }
    }

    diagnostics
}

fn unresolved_link_diagnostics(pages: &[Page], lookup: &PageLookup) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for page in pages.iter().filter(|p| p.is_public()) {
        let mut seen = HashSet::new();
        for block in page.all_blocks() {
            for page_ref in extract_page_refs(&block.text) {
                if lookup.find(&page_ref.target).is_none()
                    && seen.insert(normalize_title(&page_ref.target))
                {
                    diagnostics.push(Diagnostic {
                        code: "link.unresolved".to_string(),
                        message: format!("No page titled '{}'", page_ref.target),
                        severity: DiagnosticSeverity::Info,
                        source_path: Some(page.source_path.to_string_lossy().replace('\\', "/")),
                    });
                }
            }
        }
    }
    diagnostics
}

/// Image and attachment files under `<root>/assets`, keyed by file name
fn discover_assets(root: &Path) -> BTreeMap<String, PathBuf> {
    let assets_dir = root.join("assets");
    let mut assets = BTreeMap::new();
    if !assets_dir.is_dir() {
        return assets;
    }

    let mut files: Vec<PathBuf> = WalkDir::new(&assets_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();

    for path in files {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            assets.entry(name.to_string()).or_insert(path.clone());
        }
    }
    tracing::debug!("Found {} assets", assets.len());
    assets
}

/// `pages/Campaign___Session 1.md` -> `pages/campaign-session-1.html`
pub fn output_path_for(rel_path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(parent) = rel_path.parent() {
        for component in parent.components() {
            let name = component.as_os_str().to_string_lossy();
            let slug = slugify(&name);
            parts.push(if slug.is_empty() { "_".to_string() } else { slug });
        }
    }

    let stem = rel_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let slug = slugify(&decode_file_stem(&stem));
    parts.push(format!(
        "{}.html",
        if slug.is_empty() { "page" } else { slug.as_str() }
    ));
    parts.join("/")
}

fn journal_date(rel_path: &Path, stem: &str) -> Option<NaiveDate> {
    let in_journals = rel_path
        .components()
        .next()
        .is_some_and(|c| c.as_os_str() == "journals");
    if !in_journals {
        return None;
    }
    NaiveDate::parse_from_str(stem, "%Y_%m_%d").ok()
}

/// Logseq's default journal title, e.g. `Jan 15th, 2024`
pub fn journal_title(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{} {}{}, {}", date.format("%b"), day, suffix, date.year())
}

/// Split `a, [[b]], c` into `["a", "b", "c"]`
fn parse_list_property(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_start_matches("[[").trim_end_matches("]]").trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn compile_ignore_patterns(patterns: &[String]) -> Vec<Regex> {
    let mut compiled = Vec::new();
    for pat in patterns {
        match Regex::new(pat) {
            Ok(re) => compiled.push(re),
            Err(err) => tracing::warn!("Invalid ignore pattern '{}': {}", pat, err),
        }
    }
    compiled
}

fn should_ignore(path: &str, ignores: &[Regex]) -> bool {
    ignores.iter().any(|re| re.is_match(path))
}
