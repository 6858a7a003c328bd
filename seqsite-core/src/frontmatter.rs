//! YAML front matter, the alternative to `key:: value` page properties.

use crate::models::Properties;
use regex::Regex;
use serde_yaml::Value;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontmatterError {
    #[error("Invalid YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Front matter must be a mapping")]
    NotAMapping,
}

static FRONTMATTER_REGEX: OnceLock<Regex> = OnceLock::new();

fn frontmatter_regex() -> &'static Regex {
    FRONTMATTER_REGEX.get_or_init(|| {
        Regex::new(r"(?s)^---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n(.*))?$").unwrap()
    })
}

/// Split a leading `---` block off the file.
///
/// Returns `(yaml, body)` when the file starts with front matter.
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let captures = frontmatter_regex().captures(content)?;
    let yaml = captures.get(1)?.as_str();
    let body = captures.get(2).map(|m| m.as_str()).unwrap_or("");
    Some((yaml, body))
}

/// Parse front matter YAML into page properties.
///
/// Scalars are stringified, sequences are joined with `, ` so that they
/// read like Logseq's comma separated property values.
///
/// # Example
///
/// ```
/// use seqsite_core::frontmatter::parse_yaml_properties;
///
/// let props = parse_yaml_properties("public: true\ntags: [npc, villain]").unwrap();
/// assert_eq!(props.get("public"), Some("true"));
/// assert_eq!(props.get("tags"), Some("npc, villain"));
/// ```
pub fn parse_yaml_properties(yaml: &str) -> Result<Properties, FrontmatterError> {
    let mut properties = Properties::new();
    if yaml.trim().is_empty() {
        return Ok(properties);
    }

    let value: Value = serde_yaml::from_str(yaml)?;
    let Value::Mapping(mapping) = value else {
        return Err(FrontmatterError::NotAMapping);
    };

    for (key, value) in mapping {
        let Some(key) = scalar_to_string(&key) else {
            continue;
        };
        let value = match &value {
            Value::Sequence(items) => items
                .iter()
                .filter_map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(", "),
            other => match scalar_to_string(other) {
                Some(s) => s,
                None => continue,
            },
        };
        properties.insert(key, value);
    }

    Ok(properties)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frontmatter() {
        let content = "---\ntitle: Harbor\npublic: true\n---\n- First block\n";
        let (yaml, body) = split_frontmatter(content).unwrap();
        assert_eq!(yaml, "title: Harbor\npublic: true");
        assert_eq!(body, "- First block\n");
    }

    #[test]
    fn test_split_frontmatter_without_body() {
        let (yaml, body) = split_frontmatter("---\npublic: true\n---").unwrap();
        assert_eq!(yaml, "public: true");
        assert_eq!(body, "");
    }

    #[test]
    fn test_no_frontmatter() {
        assert!(split_frontmatter("public:: true\n- block").is_none());
        assert!(split_frontmatter("- ---\n").is_none());
    }

    #[test]
    fn test_parse_properties() {
        let props = parse_yaml_properties("title: Harbor\npublic: true\nlevel: 3").unwrap();
        assert_eq!(props.get("title"), Some("Harbor"));
        assert_eq!(props.get("public"), Some("true"));
        assert_eq!(props.get("level"), Some("3"));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            parse_yaml_properties("title: [unclosed"),
            Err(FrontmatterError::YamlError(_))
        ));
        assert!(matches!(
            parse_yaml_properties("- just\n- a list"),
            Err(FrontmatterError::NotAMapping)
        ));
    }
}
