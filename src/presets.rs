//! Preset query catalog.
//!
//! Loads a TOML file of `[[name, query_text], ...]` pairs under a
//! `queries` key. Grounded on `preset_queries_test.cc`, which reads
//! `preset-queries.toml` the same way and then compiles each query;
//! this crate doesn't compile query text (that's explicitly out of
//! scope), so `load_presets` only validates the catalog's shape.

use serde::Deserialize;
use std::path::Path;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetQuery {
    pub name: String,
    pub query_text: String,
}

#[derive(Debug, Deserialize)]
struct PresetFile {
    queries: Vec<(String, String)>,
}

/// Parse a preset-query TOML document already read into memory.
pub fn parse_presets(toml_str: &str) -> CoreResult<Vec<PresetQuery>> {
    let file: PresetFile = toml::from_str(toml_str).map_err(|e| CoreError::ParseError {
        message: format!("invalid preset-queries TOML: {e}"),
    })?;
    Ok(file
        .queries
        .into_iter()
        .map(|(name, query_text)| PresetQuery { name, query_text })
        .collect())
}

/// Load and parse a preset-query catalog from disk.
pub fn load_presets(path: &Path) -> CoreResult<Vec<PresetQuery>> {
    let contents = std::fs::read_to_string(path)?;
    parse_presets(&contents)
}
