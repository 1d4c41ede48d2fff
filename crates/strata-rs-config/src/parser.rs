//! Text parsing for file-backed sources.

use crate::ConfigError;
use log::debug;
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Formats the default parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
    Json,
    Json5,
    Yaml,
}

impl ConfigFormat {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "json5" => Some(Self::Json5),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    /// Detect the format of `path` from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|extension| extension.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Json5 => "json5",
            Self::Yaml => "yaml",
        })
    }
}

/// Turns config text into a generic tree.
pub trait TreeParser {
    fn parse(&self, text: &str, format: ConfigFormat) -> Result<Value, ConfigError>;

    /// Parse `text`, detecting the format from `path`.
    fn parse_path(&self, text: &str, path: &Path) -> Result<Value, ConfigError> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::ParseFailed {
            format: path
                .extension()
                .and_then(|extension| extension.to_str())
                .unwrap_or("unknown")
                .to_string(),
            message: format!("unsupported config format: {}", path.display()),
        })?;
        self.parse(text, format)
    }
}

/// JSON and JSON5 through `json5`, YAML through `serde_yaml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatParser;

impl TreeParser for FormatParser {
    fn parse(&self, text: &str, format: ConfigFormat) -> Result<Value, ConfigError> {
        debug!("parsing config text (format={format}, len={})", text.len());
        let failed = |message: String| ConfigError::ParseFailed {
            format: format.to_string(),
            message,
        };
        match format {
            ConfigFormat::Json | ConfigFormat::Json5 => {
                json5::from_str::<Value>(text).map_err(|err| failed(err.to_string()))
            }
            ConfigFormat::Yaml => {
                // An empty YAML document is an empty tree, not null.
                if text.trim().is_empty() {
                    return Ok(Value::Object(serde_json::Map::new()));
                }
                serde_yaml::from_str::<Value>(text).map_err(|err| failed(err.to_string()))
            }
        }
    }
}
