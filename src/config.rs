//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [pool]
//! capacity_pages = 2048
//! latch_timeout_ms = 250
//!
//! [btree]
//! leaf_capacity = 32
//!
//! [cursor]
//! verify_restores = true
//! ```
//!
//! Missing sections and keys fall back to their defaults.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::primitives::pager::{BufferPool, BufferPoolOptions};
use crate::storage::btree::{BTreeOptions, CursorOptions};
use crate::types::{PcursorError, Result};

/// Settings for the pool, trees and cursors.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Buffer pool settings.
    pub pool: BufferPoolOptions,
    /// B-tree settings.
    pub btree: BTreeOptions,
    /// Persistent cursor settings.
    pub cursor: CursorOptions,
}

impl EngineConfig {
    /// Parses and validates configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| PcursorError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text).map_err(|err| match err {
            PcursorError::Config(msg) => {
                PcursorError::Config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.btree.validate()?;
        Ok(())
    }

    /// Creates a buffer pool from the `[pool]` section.
    pub fn open_pool(&self) -> Result<Arc<BufferPool>> {
        Ok(Arc::new(BufferPool::new(self.pool.clone())?))
    }
}
