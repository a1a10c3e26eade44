//! Configuration resolution for tiku-ingest
//!
//! Multi-tier resolution with ENV → TOML priority for the API credential
//! and CLI → ENV → TOML → default for the root folder. Engine tunables and
//! the group table come from the TOML file, with compiled defaults.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tiku_common::config::TomlConfig;
use tiku_common::{Error, Result};
use tracing::{info, warn};

use crate::models::{Catalog, GroupSpec};
use crate::services::validator::DEFAULT_MIN_LENGTH;
use crate::services::vision_client::VisionSettings;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TIKU_ROOT_FOLDER";
/// Environment variable carrying the vision API key
pub const API_KEY_ENV: &str = "TIKU_API_KEY";

/// Engine tunables from the `[engine]` TOML section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Extraction attempts before any tie-break
    pub initial_votes: u32,
    /// Minimum accepted length, in characters
    pub min_length: usize,
    /// Concurrent voter calls per batch; 1 = sequential
    pub batch_size: usize,
    /// Consecutive zero-acceptance rounds before stopping as stalled
    pub stall_rounds: u32,
    /// Hard round ceiling
    pub max_rounds: u32,
    /// Flush the store after this many acceptances; 1 = every acceptance
    pub flush_every: usize,
    /// Shuffle the work list each round
    pub shuffle: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            initial_votes: 2,
            min_length: DEFAULT_MIN_LENGTH,
            batch_size: 1,
            stall_rounds: 3,
            max_rounds: 200,
            flush_every: 1,
            shuffle: false,
        }
    }
}

/// Full TOML surface read by tiku-ingest: the shared keys plus the
/// `[api]`, `[engine]` and `[groups]` sections
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestToml {
    #[serde(flatten)]
    pub common: TomlConfig,
    pub api: VisionSettings,
    pub engine: EngineSettings,
    /// Group table override; empty means the standard catalog
    pub groups: BTreeMap<String, GroupSpec>,
}

/// Fully resolved ingest configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub root_folder: PathBuf,
    pub api_key: String,
    pub vision: VisionSettings,
    pub engine: EngineSettings,
    pub catalog: Catalog,
}

impl IngestConfig {
    /// Resolve the full configuration from CLI overrides, environment and
    /// the TOML config file
    pub fn resolve(cli_root: Option<&str>, config_path: Option<&Path>) -> Result<Self> {
        let toml = load_layered_toml(config_path)?;

        let root_folder =
            tiku_common::config::resolve_root_folder(cli_root, ROOT_FOLDER_ENV, &toml.common);
        let api_key = resolve_api_key(&toml.common)?;
        let catalog = catalog_from_toml(&toml.groups)?;

        Ok(Self {
            root_folder,
            api_key,
            vision: toml.api,
            engine: toml.engine,
            catalog,
        })
    }
}

/// Load the TOML file: an explicit path must parse; the default path is
/// optional and falls back to compiled defaults
fn load_layered_toml(config_path: Option<&Path>) -> Result<IngestToml> {
    match config_path {
        Some(path) => load_ingest_toml(path),
        None => match tiku_common::config::default_config_path() {
            Ok(path) if path.exists() => load_ingest_toml(&path),
            _ => Ok(IngestToml::default()),
        },
    }
}

/// Parse the full ingest TOML surface from one file
pub fn load_ingest_toml(path: &Path) -> Result<IngestToml> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Resolve the vision API key from 2-tier configuration
///
/// Priority: environment → TOML.
pub fn resolve_api_key(toml: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| is_valid_key(key));
    let toml_key = toml
        .api_key
        .as_ref()
        .filter(|key| is_valid_key(key))
        .cloned();

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Vision API key found in both environment and TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("Vision API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Vision API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "Vision API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: ~/.config/tiku/config.toml (api_key = \"your-key\")",
        API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Build the catalog from the `[groups]` table, or the standard catalog
/// when the table is absent
fn catalog_from_toml(groups: &BTreeMap<String, GroupSpec>) -> Result<Catalog> {
    if groups.is_empty() {
        return Ok(Catalog::standard());
    }

    let mut table = BTreeMap::new();
    for (key, spec) in groups {
        let group: u32 = key
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid group number '{}'", key)))?;
        table.insert(group, spec.clone());
    }
    Catalog::new(table)
}
