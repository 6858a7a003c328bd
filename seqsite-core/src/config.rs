//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Main configuration struct matching the seqsite.yml schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Page/block property keys that are never rendered
    #[serde(default = "default_hidden_properties")]
    pub hidden_properties: Vec<String>,

    /// Number of spaces that make up one outline level
    #[serde(default = "default_indent_width")]
    pub indent_width: usize,

    #[serde(default = "default_excerpt_length")]
    pub excerpt_length: usize,

    #[serde(default = "default_true")]
    pub enable_backlinks: bool,

    #[serde(default)]
    pub images: ImagesConfig,

    // Internal: path to config file (for relative path resolution)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_ignore_patterns() -> Vec<String> {
    vec![
        r"^logseq/".to_string(),
        r"(^|/)\.".to_string(),
        r"^version-files/".to_string(),
    ]
}

fn default_hidden_properties() -> Vec<String> {
    ["public", "id", "title", "alias", "collapsed", "heading"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_indent_width() -> usize {
    2
}

fn default_excerpt_length() -> usize {
    150
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_title")]
    pub title: String,

    #[serde(default)]
    pub description: String,
}

fn default_site_title() -> String {
    String::from("Notes")
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_site_title(),
            description: String::new(),
        }
    }
}

/// Re-encoding of raster assets on copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_true")]
    pub optimize: bool,

    /// Wider images are scaled down to this width
    #[serde(default = "default_max_image_width")]
    pub max_width: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_max_image_width() -> u32 {
    2000
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            max_width: default_max_image_width(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the outline graph (contains pages/, journals/, assets/)
    #[serde(default = "default_input")]
    pub input: PathBuf,

    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Stylesheet copied to the output (None means use built-in)
    #[serde(default)]
    pub stylesheet: Option<PathBuf>,
}

fn default_input() -> PathBuf {
    PathBuf::from(".")
}

fn default_output() -> PathBuf {
    PathBuf::from("html-output")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output: default_output(),
            stylesheet: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: SiteConfig::default(),
            paths: PathsConfig::default(),
            ignore_patterns: default_ignore_patterns(),
            hidden_properties: default_hidden_properties(),
            indent_width: default_indent_width(),
            excerpt_length: default_excerpt_length(),
            enable_backlinks: true,
            images: ImagesConfig::default(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Load the config file if it exists, otherwise fall back to defaults
    /// relative to the current directory.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {:?}; using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.indent_width == 0 {
            return Err(ConfigError::InvalidValue {
                field: "indent_width".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.images.max_width == 0 {
            return Err(ConfigError::InvalidValue {
                field: "images.max_width".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.images.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                field: "images.jpeg_quality".to_string(),
                reason: "must be between 1 and 100".to_string(),
            });
        }
        Ok(())
    }

    /// Get the input (graph root) directory, resolved relative to config file
    pub fn input_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.input)
    }

    /// Get the output directory, resolved relative to config file
    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.output)
    }

    /// Get the custom stylesheet (None means use built-in)
    pub fn stylesheet_path(&self) -> Option<PathBuf> {
        self.paths.stylesheet.as_ref().map(|p| self.resolve_path(p))
    }

    /// Override the input directory (CLI flag)
    pub fn set_input_dir(&mut self, dir: PathBuf) {
        self.paths.input = dir;
    }

    /// Override the output directory (CLI flag)
    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.paths.output = dir;
    }

    /// Whether a property key should be kept out of rendered output
    pub fn is_hidden_property(&self, key: &str) -> bool {
        self.hidden_properties
            .iter()
            .any(|hidden| hidden.eq_ignore_ascii_case(key))
    }

    /// Resolve a path relative to the config file location
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(parent) = self.config_path.as_ref().and_then(|p| p.parent()) {
            parent.join(path)
        } else {
            path.to_path_buf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.site.title, "Notes");
        assert_eq!(config.paths.output, PathBuf::from("html-output"));
        assert_eq!(config.indent_width, 2);
        assert_eq!(config.excerpt_length, 150);
        assert!(config.enable_backlinks);
        assert!(config.is_hidden_property("public"));
        assert!(config.is_hidden_property("ID"));
        assert!(!config.is_hidden_property("type"));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml(
            r#"
site:
  title: "De Amaristische Zee"
paths:
  output: "public"
"#,
        )
        .unwrap();

        assert_eq!(config.site.title, "De Amaristische Zee");
        assert_eq!(config.paths.input, PathBuf::from("."));
        assert_eq!(config.paths.output, PathBuf::from("public"));
        assert_eq!(config.ignore_patterns.len(), 3);
    }

    #[test]
    fn test_zero_indent_rejected() {
        let result = Config::from_yaml("indent_width: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_image_settings() {
        let config = Config::from_yaml("images:\n  max_width: 1200\n").unwrap();
        assert!(config.images.optimize);
        assert_eq!(config.images.max_width, 1200);
        assert_eq!(config.images.jpeg_quality, 85);

        let result = Config::from_yaml("images:\n  jpeg_quality: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_paths_resolve_relative_to_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seqsite.yml");
        std::fs::write(&path, "paths:\n  input: graph\n  output: out\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.input_dir(), dir.path().join("graph"));
        assert_eq!(config.output_dir(), dir.path().join("out"));
        assert_eq!(config.stylesheet_path(), None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.output_dir(), PathBuf::from("html-output"));
    }
}
