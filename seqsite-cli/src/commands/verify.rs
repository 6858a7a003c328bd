//! Verify the notes graph and report diagnostics without writing output.

use anyhow::{bail, Context, Result};
use seqsite_core::{Config, Diagnostic, DiagnosticSeverity, SiteBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct VerificationSummary<'a> {
    pages: usize,
    public_pages: usize,
    errors: usize,
    warnings: usize,
    infos: usize,
    diagnostics: &'a [Diagnostic],
}

/// Run discovery and indexing and surface diagnostics.
pub fn verify_site(config_path: &Path, input: Option<PathBuf>, json: bool) -> Result<()> {
    let mut config =
        Config::load_or_default(config_path).context("Failed to load configuration")?;
    if let Some(input) = input {
        config.set_input_dir(input);
    }

    let site_index = SiteBuilder::new(config)
        .build()
        .context("Failed to build site for verification")?;

    let diagnostics = &site_index.diagnostics;
    let count = |severity: DiagnosticSeverity| {
        diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    };

    let summary = VerificationSummary {
        pages: site_index.pages.len(),
        public_pages: site_index.public_pages().len(),
        errors: count(DiagnosticSeverity::Error),
        warnings: count(DiagnosticSeverity::Warning),
        infos: count(DiagnosticSeverity::Info),
        diagnostics,
    };

    if json {
        let payload = serde_json::to_string_pretty(&summary)?;
        println!("{}", payload);
    } else {
        println!(
            "Verification complete: {} pages ({} public), {} errors, {} warnings, {} info",
            summary.pages, summary.public_pages, summary.errors, summary.warnings, summary.infos
        );
        for diag in diagnostics {
            let source = diag
                .source_path
                .as_deref()
                .map(|s| format!(" ({})", s))
                .unwrap_or_default();
            println!(
                "- {:?} {}{}: {}",
                diag.severity, diag.code, source, diag.message
            );
        }
    }

    if summary.errors > 0 {
        bail!("Verification found {} error(s)", summary.errors);
    }
    Ok(())
}
