//! Plain-text excerpts for the index page.

use crate::links::strip_page_refs;
use crate::models::Page;
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

static IMAGE: OnceLock<Regex> = OnceLock::new();
static MD_LINK: OnceLock<Regex> = OnceLock::new();
static MACRO: OnceLock<Regex> = OnceLock::new();

/// Excerpt for a page: first sentence of its first block with text,
/// markup stripped and truncated to `max_graphemes`.
pub fn page_excerpt(page: &Page, max_graphemes: usize) -> Option<String> {
    let block = page
        .all_blocks()
        .into_iter()
        .find(|b| !plain_text(&b.text).is_empty())?;

    let text = plain_text(&block.text);
    Some(truncate(first_sentence(&text), max_graphemes))
}

/// Strip outline and markdown markup from block text
pub fn plain_text(text: &str) -> String {
    let image = IMAGE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
    let md_link = MD_LINK.get_or_init(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
    let macro_call = MACRO.get_or_init(|| Regex::new(r"\{\{[^}]*\}\}").unwrap());

    let text = macro_call.replace_all(text, "");
    let text = image.replace_all(&text, "");
    let text = strip_page_refs(&text.replace("#[[", "[["));
    let text = md_link.replace_all(&text, "$1");

    let mut cleaned = text.into_owned();
    for marker in ["**", "__", "~~", "==", "`"] {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned
        .lines()
        .map(|l| l.trim_start_matches('#').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text up to and including the first `.`, `!` or `?` followed by whitespace
pub fn first_sentence(text: &str) -> &str {
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    return text[..idx + c.len_utf8()].trim();
                }
            }
        }
    }
    text.trim()
}

/// Truncate to `max` graphemes, ending in `...` when shortened
pub fn truncate(text: &str, max: usize) -> String {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    if graphemes.len() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    format!("{}...", graphemes[..keep].concat().trim_end())
}
