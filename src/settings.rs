//! Declarative indexer settings.
//!
//! Settings pair a unique indexer name with a [`SelectionRule`] and a storage
//! backend choice. They deserialize from TOML, so a deployment can declare
//! its indexes in configuration:
//!
//! ```toml
//! name = "geo"
//! backend = { kind = "sqlite", path = "/var/lib/store/geo.db" }
//!
//! [selection]
//! datatype = "http://rdf.opensahara.com/type/geo/wkt"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::filter::SelectionRule;

/// Which storage backend an index persists its entries in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Entries live only in process memory.
    #[default]
    Memory,
    /// Entries live in an embedded SQLite database file.
    Sqlite {
        /// Database file path; created on first open.
        path: PathBuf,
    },
}

/// Configuration of a single named index.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexerSettings {
    name: String,
    selection: SelectionRule,
    #[serde(default)]
    backend: BackendConfig,
}

impl IndexerSettings {
    /// Creates settings with the in-memory backend.
    pub fn new(name: impl Into<String>, selection: SelectionRule) -> Self {
        Self {
            name: name.into(),
            selection,
            backend: BackendConfig::Memory,
        }
    }

    /// Returns the settings with the given backend (builder style).
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// The unique name of the index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the index.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The selection rule deciding which statements this index covers.
    pub fn selection(&self) -> &SelectionRule {
        &self.selection
    }

    /// The configured storage backend.
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Parses settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| IndexError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and parses a TOML settings file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(IndexError::Config("indexer name must not be empty".into()));
        }
        Ok(())
    }
}
