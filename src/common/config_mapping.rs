//! Generic configuration documents.
//!
//! YAML, JSON and TOML files are all parsed into the same JSON-compatible
//! value tree so callers can look keys up by name or by dotted path without
//! knowing which format the file was written in.

use crate::error::{ConfigSyntaxError, IngestError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Picks the format from the file extension, YAML when unknown.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("json") => ConfigFormat::Json,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }

    fn parse(self, content: &str) -> std::result::Result<Value, ConfigSyntaxError> {
        let value = match self {
            ConfigFormat::Yaml => serde_yaml::from_str::<Value>(content)?,
            ConfigFormat::Json => serde_json::from_str::<Value>(content)?,
            ConfigFormat::Toml => toml::from_str::<Value>(content)?,
        };
        Ok(value)
    }
}

/// A parsed configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigMapping {
    entries: Map<String, Value>,
}

impl ConfigMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> std::result::Result<Self, ConfigSyntaxError> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            Value::Null => Ok(Self::new()),
            other => Err(ConfigSyntaxError::NotAMapping {
                found: value_type_name(&other).to_string(),
            }),
        }
    }

    pub fn parse_str(content: &str, format: ConfigFormat) -> std::result::Result<Self, ConfigSyntaxError> {
        if content.trim().is_empty() {
            return Ok(Self::new());
        }
        Self::from_value(format.parse(content)?)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Looks up a dotted path such as `data_ingestion.source_URL`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.entries.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get_path(path).and_then(Value::as_str)
    }

    /// Nested mapping under `key`, if that key holds a mapping.
    pub fn section(&self, key: &str) -> Option<ConfigMapping> {
        match self.get_path(key)? {
            Value::Object(map) => Some(Self {
                entries: map.clone(),
            }),
            _ => None,
        }
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.entries.clone())).map_err(|e| {
            IngestError::Config {
                message: e.to_string(),
            }
        })
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

/// Reads and parses a YAML, JSON or TOML config file.
///
/// An empty document is a warning, not an error, and yields an empty mapping.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<ConfigMapping> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| IngestError::file_access(path, e))?;

    let mapping = ConfigMapping::parse_str(&content, ConfigFormat::from_path(path)).map_err(
        |source| IngestError::ConfigParse {
            path: path.display().to_string(),
            source,
        },
    )?;

    if mapping.is_empty() {
        warn!(path = %path.display(), "config file is empty");
    } else {
        info!(path = %path.display(), keys = mapping.len(), "config file loaded");
    }

    Ok(mapping)
}

/// Loads a JSON file regardless of its extension.
pub fn load_json<P: AsRef<Path>>(path: P) -> Result<ConfigMapping> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| IngestError::file_access(path, e))?;
    let mapping = ConfigMapping::parse_str(&content, ConfigFormat::Json).map_err(|source| {
        IngestError::ConfigParse {
            path: path.display().to_string(),
            source,
        }
    })?;
    info!(path = %path.display(), "JSON file loaded");
    Ok(mapping)
}

/// Writes `data` as pretty-printed JSON.
pub fn save_json<P: AsRef<Path>, T: Serialize + ?Sized>(path: P, data: &T) -> Result<()> {
    let path = path.as_ref();
    let content = serde_json::to_string_pretty(data).map_err(|e| IngestError::Serialization {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    fs::write(path, content).map_err(|e| IngestError::file_access(path, e))?;
    info!(path = %path.display(), "JSON file saved");
    Ok(())
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
