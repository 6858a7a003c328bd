//! Outline parsing: page properties plus the indented bullet tree.
//!
//! Parsing is tolerant. Malformed indentation is clamped, stray text is
//! kept as a block, and nothing in here returns an error; problems with
//! front matter are reported back as strings for the caller to log.

use crate::frontmatter::{parse_yaml_properties, split_frontmatter};
use crate::models::{Block, Properties, TaskMarker};
use regex::Regex;
use std::sync::OnceLock;

static PROPERTY_LINE: OnceLock<Regex> = OnceLock::new();
static HEADING_LINE: OnceLock<Regex> = OnceLock::new();
static BLOCK_REF: OnceLock<Regex> = OnceLock::new();

fn property_line() -> &'static Regex {
    PROPERTY_LINE
        .get_or_init(|| Regex::new(r"^([A-Za-z][A-Za-z0-9_-]*)::(?:\s+(.*?))?\s*$").unwrap())
}

fn heading_line() -> &'static Regex {
    HEADING_LINE.get_or_init(|| Regex::new(r"^(#{1,6})[ \t]+([^\n]*)").unwrap())
}

fn block_ref() -> &'static Regex {
    BLOCK_REF.get_or_init(|| Regex::new(r"\(\([0-9a-fA-F-]{8,}\)\)").unwrap())
}

/// Parse a `key:: value` line
pub fn parse_property_line(line: &str) -> Option<(String, String)> {
    let captures = property_line().captures(line.trim())?;
    let key = captures.get(1)?.as_str().to_string();
    let value = captures
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    Some((key, value))
}

/// Result of parsing one outline file
#[derive(Debug, Clone, Default)]
pub struct ParsedOutline {
    pub properties: Properties,
    pub blocks: Vec<Block>,
    /// Non-fatal problems (e.g. broken front matter)
    pub problems: Vec<String>,
}

/// A bullet before tree assembly
#[derive(Debug)]
struct RawBlock {
    depth: usize,
    /// Whitespace characters to strip from continuation lines
    content_col: usize,
    lines: Vec<String>,
    in_fence: bool,
}

impl RawBlock {
    fn push_line(&mut self, line: &str) {
        if line.trim_start().starts_with("```") {
            self.in_fence = !self.in_fence;
        }
        self.lines.push(line.to_string());
    }
}

/// Outline parser
pub struct OutlineParser {
    indent_width: usize,
    hidden_properties: Vec<String>,
}

impl OutlineParser {
    pub fn new(indent_width: usize) -> Self {
        Self {
            indent_width: indent_width.max(1),
            hidden_properties: Vec::new(),
        }
    }

    /// Property keys that never render; a bullet holding only these is dropped
    pub fn with_hidden_properties(mut self, keys: &[String]) -> Self {
        self.hidden_properties = keys.to_vec();
        self
    }

    /// Parse a whole file into page properties and a block tree
    pub fn parse(&self, content: &str) -> ParsedOutline {
        let mut outline = ParsedOutline::default();

        let body = match split_frontmatter(content) {
            Some((yaml, body)) => {
                match parse_yaml_properties(yaml) {
                    Ok(props) => outline.properties = props,
                    Err(err) => outline.problems.push(format!("front matter ignored: {err}")),
                }
                body
            }
            None => content,
        };

        let (preamble, raw_blocks) = self.split_lines(body, &mut outline.properties);

        let mut blocks: Vec<Block> = Vec::new();
        if let Some(text) = preamble {
            blocks.push(self.build_block(text.lines().map(str::to_string).collect(), 0));
        }
        for raw in raw_blocks {
            let block = self.build_block(strip_continuations(&raw), raw.depth);

            // A leading bullet holding nothing but properties is the page's
            // property block.
            if blocks.is_empty()
                && outline.properties.is_empty()
                && block.text.trim().is_empty()
                && !block.properties.is_empty()
                && block.depth == 0
            {
                outline.properties = block.properties;
                continue;
            }
            blocks.push(block);
        }

        outline.blocks = self.prune_empty(assemble_tree(blocks));
        outline
    }

    fn prune_empty(&self, blocks: Vec<Block>) -> Vec<Block> {
        blocks
            .into_iter()
            .filter_map(|mut block| {
                block.children = self.prune_empty(std::mem::take(&mut block.children));
                let renders_nothing = block.text.trim().is_empty()
                    && block.children.is_empty()
                    && block.marker.is_none()
                    && block.properties.iter().all(|p| {
                        p.value.trim().is_empty()
                            || self
                                .hidden_properties
                                .iter()
                                .any(|hidden| hidden.eq_ignore_ascii_case(&p.key))
                    });
                (!renders_nothing).then_some(block)
            })
            .collect()
    }

    /// Separate pre-bullet lines (properties and loose text) from bullets
    fn split_lines(
        &self,
        body: &str,
        properties: &mut Properties,
    ) -> (Option<String>, Vec<RawBlock>) {
        let mut preamble: Vec<&str> = Vec::new();
        let mut raw_blocks: Vec<RawBlock> = Vec::new();

        for line in body.lines() {
            if let Some(current) = raw_blocks.last_mut() {
                if current.in_fence {
                    current.push_line(line);
                    continue;
                }
            }

            let (indent_chars, depth) = self.measure_indent(line);
            let rest = &line[line.len() - line.trim_start().len()..];

            if let Some(first) = bullet_text(rest) {
                let mut raw = RawBlock {
                    depth,
                    content_col: indent_chars + 2,
                    lines: Vec::new(),
                    in_fence: false,
                };
                raw.push_line(first);
                raw_blocks.push(raw);
                continue;
            }

            match raw_blocks.last_mut() {
                Some(current) => current.push_line(line),
                None => {
                    if preamble.is_empty() {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Some((key, value)) = parse_property_line(line) {
                            properties.insert(key, value);
                            continue;
                        }
                    }
                    preamble.push(line);
                }
            }
        }

        let preamble = if preamble.iter().all(|l| l.trim().is_empty()) {
            None
        } else {
            Some(preamble.join("\n"))
        };
        (preamble, raw_blocks)
    }

    /// Returns (leading whitespace characters, outline depth)
    fn measure_indent(&self, line: &str) -> (usize, usize) {
        let mut tabs = 0;
        let mut spaces = 0;
        for c in line.chars() {
            match c {
                '\t' => tabs += 1,
                ' ' => spaces += 1,
                _ => break,
            }
        }
        (tabs + spaces, tabs + spaces / self.indent_width)
    }

    /// Turn collected lines into a block: properties, heading, marker
    fn build_block(&self, lines: Vec<String>, depth: usize) -> Block {
        let mut block = Block::new(String::new(), depth);
        let mut text_lines: Vec<String> = Vec::new();
        let mut in_fence = false;

        for line in lines {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            if !in_fence {
                if let Some((key, value)) = parse_property_line(&line) {
                    block.properties.insert(key, value);
                    continue;
                }
            }
            text_lines.push(line);
        }

        while text_lines.last().is_some_and(|l| l.trim().is_empty()) {
            text_lines.pop();
        }

        let mut text = block_ref().replace_all(&text_lines.join("\n"), "").into_owned();

        if let Some((level, rest)) = split_heading(&text) {
            block.heading = Some(level);
            text = rest;
        } else if let Some(level) = block.properties.get("heading").and_then(heading_level) {
            block.heading = Some(level);
        }

        let (marker, rest) = split_task_marker(&text);
        block.marker = marker;
        block.text = rest.trim().to_string();
        block
    }
}

impl Default for OutlineParser {
    fn default() -> Self {
        Self::new(2)
    }
}

/// The text after a `- ` bullet, or `None` if the line is not a bullet
fn bullet_text(trimmed: &str) -> Option<&str> {
    if trimmed == "-" {
        Some("")
    } else {
        trimmed.strip_prefix("- ")
    }
}

fn strip_continuations(raw: &RawBlock) -> Vec<String> {
    raw.lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                return line.clone();
            }
            let strip = line
                .chars()
                .take(raw.content_col)
                .take_while(|c| *c == ' ' || *c == '\t')
                .map(char::len_utf8)
                .sum::<usize>();
            line[strip..].to_string()
        })
        .collect()
}

fn split_heading(text: &str) -> Option<(u8, String)> {
    let captures = heading_line().captures(text)?;
    let whole = captures.get(0)?;
    let level = captures[1].len() as u8;
    Some((level, format!("{}{}", captures[2].trim_end(), &text[whole.end()..])))
}

fn heading_level(value: &str) -> Option<u8> {
    match value.trim() {
        "true" => Some(2),
        other => other.parse::<u8>().ok().filter(|l| (1..=6).contains(l)),
    }
}

fn split_task_marker(text: &str) -> (Option<TaskMarker>, &str) {
    let (word, rest) = match text.split_once(' ') {
        Some((word, rest)) => (word, rest),
        None => (text, ""),
    };
    match TaskMarker::from_keyword(word) {
        Some(marker) => (Some(marker), rest),
        None => (None, text),
    }
}

/// Build the block tree from a flat list in document order.
///
/// A block may be at most one level deeper than the block before it;
/// deeper blocks are clamped to the nearest valid parent.
pub fn assemble_tree(blocks: Vec<Block>) -> Vec<Block> {
    let mut roots: Vec<Block> = Vec::new();
    let mut stack: Vec<Block> = Vec::new();

    fn close(stack: &mut Vec<Block>, roots: &mut Vec<Block>) {
        if let Some(done) = stack.pop() {
            match stack.last_mut() {
                Some(parent) => parent.children.push(done),
                None => roots.push(done),
            }
        }
    }

    for mut block in blocks {
        let depth = block.depth.min(stack.len());
        while stack.len() > depth {
            close(&mut stack, &mut roots);
        }
        block.depth = depth;
        stack.push(block);
    }
    while !stack.is_empty() {
        close(&mut stack, &mut roots);
    }

    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> ParsedOutline {
        OutlineParser::default().parse(content)
    }

    #[test]
    fn test_page_properties_before_first_bullet() {
        let outline = parse("public:: true\ntype:: npc\n\n- First block\n");
        assert_eq!(outline.properties.get("public"), Some("true"));
        assert_eq!(outline.properties.get("type"), Some("npc"));
        assert_eq!(outline.blocks.len(), 1);
        assert_eq!(outline.blocks[0].text, "First block");
    }

    #[test]
    fn test_property_only_first_bullet_is_page_properties() {
        let outline = parse("- public:: true\n  tags:: harbor\n- Body\n");
        assert_eq!(outline.properties.get("public"), Some("true"));
        assert_eq!(outline.properties.get("tags"), Some("harbor"));
        assert_eq!(outline.blocks.len(), 1);
        assert_eq!(outline.blocks[0].text, "Body");
    }

    #[test]
    fn test_front_matter_properties() {
        let outline = parse("---\npublic: true\n---\n- Body\n");
        assert_eq!(outline.properties.get("public"), Some("true"));
        assert_eq!(outline.blocks[0].text, "Body");
    }

    #[test]
    fn test_broken_front_matter_is_reported_not_fatal() {
        let outline = parse("---\npublic: [oops\n---\n- Body\n");
        assert!(outline.properties.is_empty());
        assert_eq!(outline.problems.len(), 1);
        assert_eq!(outline.blocks[0].text, "Body");
    }

    #[test]
    fn test_nesting_with_tabs() {
        let outline = parse("- Parent\n\t- Child\n\t\t- Grandchild\n- Sibling\n");
        assert_eq!(outline.blocks.len(), 2);
        let parent = &outline.blocks[0];
        assert_eq!(parent.depth, 0);
        assert_eq!(parent.children[0].text, "Child");
        assert_eq!(parent.children[0].depth, 1);
        assert_eq!(parent.children[0].children[0].text, "Grandchild");
        assert_eq!(parent.children[0].children[0].depth, 2);
        assert_eq!(outline.blocks[1].text, "Sibling");
    }

    #[test]
    fn test_nesting_with_spaces() {
        let outline = parse("- Parent\n  - Child\n    - Grandchild\n");
        assert_eq!(outline.blocks[0].children[0].children[0].text, "Grandchild");
    }

    #[test]
    fn test_over_indented_block_is_clamped() {
        let outline = parse("- Parent\n\t\t\t- Too deep\n\t- Child\n");
        let parent = &outline.blocks[0];
        assert_eq!(parent.children.len(), 2);
        assert_eq!(parent.children[0].text, "Too deep");
        assert_eq!(parent.children[0].depth, 1);
        assert_eq!(parent.children[1].depth, 1);
    }

    #[test]
    fn test_large_dedent() {
        let outline = parse("- A\n\t- B\n\t\t- C\n\t\t\t- D\n- E\n");
        assert_eq!(outline.blocks.len(), 2);
        assert_eq!(outline.blocks[1].text, "E");
        assert_eq!(outline.blocks[1].depth, 0);
    }

    #[test]
    fn test_first_bullet_indented_is_clamped_to_root() {
        let outline = parse("\t\t- Indented start\n- Next\n");
        assert_eq!(outline.blocks.len(), 2);
        assert_eq!(outline.blocks[0].depth, 0);
    }

    #[test]
    fn test_continuation_lines_and_block_properties() {
        let outline = parse(
            "- First line\n  second line\n  id:: 64f1c2d3-0000-4000-8000-000000000000\n  location:: Harbor\n",
        );
        let block = &outline.blocks[0];
        assert_eq!(block.text, "First line\nsecond line");
        assert_eq!(block.properties.get("location"), Some("Harbor"));
        assert!(block.properties.contains("id"));
    }

    #[test]
    fn test_code_fence_keeps_bullets_as_text() {
        let outline =
            parse("- Example\n  ```\n  - not a block\n  key:: not a property\n  ```\n- After\n");
        assert_eq!(outline.blocks.len(), 2);
        assert!(outline.blocks[0].text.contains("- not a block"));
        assert!(outline.blocks[0].text.contains("key:: not a property"));
        assert!(outline.blocks[0].properties.is_empty());
    }

    #[test]
    fn test_heading_and_task_markers() {
        let outline = parse(
            "- ## Session Log\n- DONE Find the map\n- TODO\n- heading text\n  heading:: 3\n",
        );
        assert_eq!(outline.blocks[0].heading, Some(2));
        assert_eq!(outline.blocks[0].text, "Session Log");
        assert_eq!(outline.blocks[1].marker, Some(TaskMarker::Done));
        assert_eq!(outline.blocks[1].text, "Find the map");
        assert_eq!(outline.blocks[2].marker, Some(TaskMarker::Todo));
        assert_eq!(outline.blocks[2].text, "");
        assert_eq!(outline.blocks[3].heading, Some(3));
    }

    #[test]
    fn test_block_refs_removed_and_empty_blocks_dropped() {
        let outline = parse("- See ((64f1c2d3-0000-4000-8000-000000000000)) here\n-\n- \n");
        assert_eq!(outline.blocks.len(), 1);
        assert_eq!(outline.blocks[0].text, "See  here");
    }

    #[test]
    fn test_plain_markdown_without_bullets() {
        let outline = parse("public:: true\n\nJust a paragraph.\n\nAnother one.\n");
        assert_eq!(outline.properties.get("public"), Some("true"));
        assert_eq!(outline.blocks.len(), 1);
        assert_eq!(outline.blocks[0].text, "Just a paragraph.\n\nAnother one.");
    }

    #[test]
    fn test_parse_property_line() {
        assert_eq!(
            parse_property_line("public:: true"),
            Some(("public".to_string(), "true".to_string()))
        );
        assert_eq!(
            parse_property_line("empty::"),
            Some(("empty".to_string(), String::new()))
        );
        assert_eq!(parse_property_line("https://example.com"), None);
        assert_eq!(parse_property_line("not a property"), None);
    }

    #[test]
    fn test_bullet_with_only_hidden_properties_dropped() {
        let parser = OutlineParser::new(2)
            .with_hidden_properties(&["id".to_string(), "collapsed".to_string()]);
        let outline = parser.parse(
            "- Intro
- id:: 64f1c2d3-0000-4000-8000-000000000000
- collapsed:: true
  type:: npc
",
        );
        assert_eq!(outline.blocks.len(), 2);
        assert_eq!(outline.blocks[0].text, "Intro");
        assert_eq!(outline.blocks[1].properties.get("type"), Some("npc"));
    }
}
