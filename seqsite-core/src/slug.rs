//! Slug generation, title normalization and Logseq file-name decoding.

use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

static HYPHEN_RUN: OnceLock<Regex> = OnceLock::new();

fn hyphen_run() -> &'static Regex {
    HYPHEN_RUN.get_or_init(|| Regex::new(r"-+").unwrap())
}

/// Convert a string to a URL-safe slug
///
/// Rules:
/// - Lowercase
/// - Replace whitespace, underscores and slashes with hyphens
/// - Remove special characters (except hyphens)
/// - Collapse multiple hyphens
/// - Trim leading/trailing hyphens
///
/// # Examples
///
/// ```
/// use seqsite_core::slugify;
///
/// assert_eq!(slugify("Campaign Notes"), "campaign-notes");
/// assert_eq!(slugify("Session 1/Recap"), "session-1-recap");
/// assert_eq!(slugify("C++ Programming"), "c-programming");
/// ```
pub fn slugify(input: &str) -> String {
    let lowercased = input.to_lowercase();

    let cleaned = lowercased
        .graphemes(true)
        .filter_map(|g| match g {
            " " | "_" | "\t" | "\n" | "/" => Some("-"),
            _ => {
                let c = g.chars().next()?;
                if c.is_ascii_alphanumeric() || c == '-' || c.is_alphabetic() {
                    Some(g)
                } else {
                    None
                }
            }
        })
        .collect::<String>();

    hyphen_run()
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}

/// Normalize a page title for lookup: trimmed, lowercased, inner
/// whitespace collapsed to single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Recover a page title from a Logseq file stem.
///
/// Logseq writes namespace separators as `___` and percent-escapes
/// characters that are not allowed in file names.
pub fn decode_file_stem(stem: &str) -> String {
    let with_namespaces = stem.replace("___", "/");
    percent_decode_str(&with_namespaces)
        .decode_utf8_lossy()
        .into_owned()
}

/// Make an asset file name safe to publish.
pub fn sanitize_asset_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Secret NPC"), "secret-npc");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(slugify("Rust & Safety"), "rust-safety");
        assert_eq!(slugify("What's new?"), "whats-new");
        assert_eq!(slugify("Campaign___Session 1"), "campaign-session-1");
    }

    #[test]
    fn test_unicode() {
        assert_eq!(slugify("Café"), "café");
    }

    #[test]
    fn test_empty_and_special_only() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Secret   NPC "), "secret npc");
        assert_eq!(normalize_title("Campaign/Session 1"), "campaign/session 1");
    }

    #[test]
    fn test_decode_file_stem() {
        assert_eq!(decode_file_stem("Campaign___Session 1"), "Campaign/Session 1");
        assert_eq!(decode_file_stem("What%3F"), "What?");
        assert_eq!(decode_file_stem("plain"), "plain");
    }

    #[test]
    fn test_sanitize_asset_name() {
        assert_eq!(sanitize_asset_name("map of the sea.png"), "map_of_the_sea.png");
        assert_eq!(sanitize_asset_name("image_1680-0.jpg"), "image_1680-0.jpg");
    }
}
