//! `apex-log-graph.toml`: parse limits, diagram filter and output settings.
//!
//! ```toml
//! [parse]
//! max_lines = 200000
//!
//! [filter]
//! hide_system = true
//! hidden_actors = ["Class:Logger"]
//!
//! [output]
//! format = "dot"
//! ```

use crate::domain::frame_filter::FilterOptions;
use crate::domain::parser::ParseOptions;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Dot,
    Text,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "dot" => Ok(OutputFormat::Dot),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Json => "json",
            OutputFormat::Dot => "dot",
            OutputFormat::Text => "text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Pretty-print JSON.
    pub pretty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub parse: ParseOptions,
    pub filter: FilterOptions,
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| Error::Config { path: path.to_path_buf(), source })
    }

    /// Load a config file. A missing file is an error; use `Default` when no
    /// file was named.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        let config = Self::from_toml(&text, path)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_fall_back_to_defaults() {
        let config = AppConfig::from_toml("[output]\nformat = \"dot\"\n", Path::new("x.toml")).unwrap();
        assert_eq!(config.output.format, OutputFormat::Dot);
        assert_eq!(config.parse, ParseOptions::default());
        assert!(!config.filter.hide_system);
    }

    #[test]
    fn test_full_file() {
        let text = r#"
[parse]
max_lines = 500
head_lines = 4

[filter]
hide_system = true
collapse_repeats = true
hidden_actors = ["Class:Logger"]

[output]
format = "text"
pretty = true
"#;
        let config = AppConfig::from_toml(text, Path::new("x.toml")).unwrap();
        assert_eq!(config.parse.max_lines, Some(500));
        assert_eq!(config.parse.head_lines, 4);
        assert!(config.filter.hidden_actors.contains("Class:Logger"));
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_bad_format_is_config_error() {
        let err = AppConfig::from_toml("[output]\nformat = \"svg\"\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("DOT".parse::<OutputFormat>().unwrap(), OutputFormat::Dot);
        assert!(matches!("svg".parse::<OutputFormat>(), Err(Error::UnknownFormat(_))));
    }
}
