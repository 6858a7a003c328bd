//! Build command implementation.

use crate::images::optimized_image;
use crate::output::OutputWriter;
use anyhow::{bail, Context, Result};
use include_dir::{include_dir, Dir};
use seqsite_core::links::relative_href;
use seqsite_core::{page_excerpt, Config, Page, PageRenderer, SiteBuilder};
use seqsite_render::{IndexEntry, IndexTemplate, PageLinkEntry, PageTemplate, PropertyEntry};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// Embed the default stylesheet at compile time so it's available after cargo install
static STATIC_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/static");

/// Directory overrides given on the command line
#[derive(Debug, Default)]
pub struct BuildOverrides {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Build the static site
pub fn build_site(config_path: &Path, overrides: BuildOverrides) -> Result<()> {
    let mut config =
        Config::load_or_default(config_path).context("Failed to load configuration")?;
    if let Some(input) = overrides.input {
        config.set_input_dir(input);
    }
    if let Some(output) = overrides.output {
        config.set_output_dir(output);
    }

    build_site_with_config(&config).map(|_| ())
}

/// Build the site from an already loaded config, returning the written manifest
pub fn build_site_with_config(config: &Config) -> Result<Vec<String>> {
    tracing::info!("Building site: {}", config.site.title);

    let input_dir = config.input_dir();
    let output_dir = config.output_dir();

    let site_index = SiteBuilder::new(config.clone())
        .build()
        .context("Failed to build site")?;

    let sources: Vec<&Path> = site_index
        .pages
        .iter()
        .map(|p| p.source_path.as_path())
        .collect();
    ensure_output_is_safe(&input_dir, &output_dir, &sources)?;

    // Never prune pages whose source failed to read
    let errors = site_index.errors();
    if !errors.is_empty() {
        let details: Vec<String> = errors
            .iter()
            .map(|d| format!("{}: {}", d.source_path.as_deref().unwrap_or("-"), d.message))
            .collect();
        bail!(
            "{} source file(s) could not be read; output left untouched:\n  {}",
            errors.len(),
            details.join("\n  ")
        );
    }

    let renderer = PageRenderer::new(&site_index, config);
    let mut writer = OutputWriter::new(&output_dir).context("Failed to create output directory")?;
    let mut assets: BTreeMap<String, PathBuf> = BTreeMap::new();

    let public_pages = site_index.public_pages();
    for page in &public_pages {
        let rendered = renderer.render_page(page);
        assets.extend(rendered.assets);

        let template = PageTemplate {
            title: page.title.clone(),
            properties: rendered
                .properties
                .into_iter()
                .map(|p| PropertyEntry {
                    key: p.key,
                    value_html: p.value_html,
                })
                .collect(),
            content: rendered.content,
            children: link_entries(page, &site_index.public_children(page)),
            backlinks: if config.enable_backlinks {
                link_entries(page, &site_index.public_backlinks(page))
            } else {
                Vec::new()
            },
            site_title: config.site.title.clone(),
            css_path: format!("{}styles.css", page.root_prefix()),
            index_path: format!("{}index.html", page.root_prefix()),
        };

        let html = template
            .to_html()
            .with_context(|| format!("Failed to render page {}", page.title))?;
        writer
            .write(&page.output_path, html.as_bytes())
            .with_context(|| format!("Failed to write page {}", page.title))?;
        tracing::debug!("Rendered: {}", page.output_path);
    }

    render_index(config, &public_pages, &mut writer)?;
    write_stylesheet(config, &mut writer)?;

    for (rel, source) in &assets {
        let written = match optimized_image(source, &config.images) {
            Some(bytes) => writer.write(rel, &bytes),
            None => writer.copy_file(rel, source),
        };
        written.with_context(|| format!("Failed to copy asset {:?}", source))?;
    }

    let manifest = writer.finish().context("Failed to clean output directory")?;

    tracing::info!("✓ Built {} pages", public_pages.len());
    tracing::info!("✓ Output written to {:?}", output_dir);

    Ok(manifest)
}

fn link_entries(from: &Page, pages: &[&Page]) -> Vec<PageLinkEntry> {
    pages
        .iter()
        .map(|p| PageLinkEntry {
            url: relative_href(from, p),
            title: p.title.clone(),
        })
        .collect()
}

fn render_index(
    config: &Config,
    public_pages: &[&Page],
    writer: &mut OutputWriter,
) -> Result<()> {
    let entries = public_pages
        .iter()
        .map(|p| IndexEntry {
            url: p.output_path.clone(),
            title: p.display_title().to_string(),
            parent: p.namespace().map(str::to_string),
            excerpt: page_excerpt(p, config.excerpt_length),
        })
        .collect();

    let template = IndexTemplate {
        site_title: config.site.title.clone(),
        site_description: config.site.description.clone(),
        entries,
        css_path: "styles.css".to_string(),
    };

    let html = template.to_html().context("Failed to render index template")?;
    writer
        .write("index.html", html.as_bytes())
        .context("Failed to write index.html")?;
    Ok(())
}

fn write_stylesheet(config: &Config, writer: &mut OutputWriter) -> Result<()> {
    match config.stylesheet_path() {
        Some(path) => {
            writer
                .copy_file("styles.css", &path)
                .with_context(|| format!("Failed to copy stylesheet {:?}", path))?;
            tracing::info!("Copied stylesheet from {:?}", path);
        }
        None => {
            let css = STATIC_ASSETS
                .get_file("styles.css")
                .context("Embedded stylesheet missing")?;
            writer
                .write("styles.css", css.contents())
                .context("Failed to write styles.css")?;
        }
    }
    Ok(())
}

/// Graph directories that hold the user's own files
const GRAPH_DIRS: &[&str] = &["pages", "journals", "assets", "logseq", "draws", "whiteboards"];

/// Pruning the output must never reach the notes themselves
fn ensure_output_is_safe(input: &Path, output: &Path, sources: &[&Path]) -> Result<()> {
    let input = fs::canonicalize(input)
        .with_context(|| format!("Cannot read input directory {:?}", input))?;
    let output = resolve_lexically(output);

    if input == output || input.starts_with(&output) {
        bail!(
            "Output directory {:?} would contain the input directory {:?}",
            output,
            input
        );
    }

    if let Ok(inner) = output.strip_prefix(&input) {
        if let Some(first) = inner.components().next() {
            let first = first.as_os_str().to_string_lossy();
            if GRAPH_DIRS.iter().any(|dir| first.eq_ignore_ascii_case(dir)) {
                bail!(
                    "Output directory {:?} is inside the graph's {}/ directory",
                    output,
                    first
                );
            }
        }
    }

    if let Some(source) = sources
        .iter()
        .map(|rel| input.join(rel))
        .find(|path| path.starts_with(&output))
    {
        bail!(
            "Output directory {:?} contains the source note {:?}",
            output,
            source
        );
    }
    Ok(())
}

/// Canonicalize the longest existing prefix of `path` and append the rest
fn resolve_lexically(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}
