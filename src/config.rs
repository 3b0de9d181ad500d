//! Declarative source configuration.
//!
//! Hosts describe their sources in a TOML or JSON file; each entry
//! becomes a [`SourceDescriptor`] a loader is constructed from. The
//! descriptor is immutable for the lifetime of that loader.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::SyncError;

const ENV_PATH: &str = "SOURCE_SYNC_SOURCES_PATH";

/// Identifies one external source instance: URL, optional credential,
/// and source-specific parameters (channel id, search query, table id…).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            api_key: None,
            params: BTreeMap::new(),
        }
    }
}

/// Load descriptors from an explicit path. Supports TOML or JSON.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceDescriptor>, SyncError> {
    let content = fs::read_to_string(path).map_err(|e| {
        SyncError::configuration(format!("reading sources from {}: {e}", path.display()))
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load descriptors using env var + fallbacks:
/// 1) $SOURCE_SYNC_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<Vec<SourceDescriptor>, SyncError> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(SyncError::configuration(format!(
            "{ENV_PATH} points to non-existent path"
        )));
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceDescriptor>, SyncError> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return validate(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return validate(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return validate(v);
        }
    }
    Err(SyncError::configuration("unsupported sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<SourceDescriptor>, SyncError> {
    #[derive(Deserialize)]
    struct TomlSources {
        sources: Vec<SourceDescriptor>,
    }
    let v: TomlSources =
        toml::from_str(s).map_err(|e| SyncError::configuration(e.to_string()))?;
    Ok(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceDescriptor>, SyncError> {
    serde_json::from_str(s).map_err(|e| SyncError::configuration(e.to_string()))
}

fn validate(sources: Vec<SourceDescriptor>) -> Result<Vec<SourceDescriptor>, SyncError> {
    for src in &sources {
        if src.name.trim().is_empty() {
            return Err(SyncError::configuration("source with empty name"));
        }
        if src.url.trim().is_empty() {
            return Err(SyncError::configuration(format!(
                "source \"{}\" has no url",
                src.name
            )));
        }
    }
    Ok(sources)
}
