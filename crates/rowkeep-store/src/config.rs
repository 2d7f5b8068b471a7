//! Store configuration
//!
//! Loaded from YAML:
//!
//! ```yaml
//! path: data/app.db
//! foreign_keys: true
//! journal_mode: WAL
//! busy_timeout_ms: 5000
//! tables:
//!   USER:
//!     migrate: true
//!   AUDIT:
//!     deploy: false
//! ```
//!
//! Every key is optional. `tables` overrides the deploy flags an entity
//! declares, keyed by table name.

use crate::errors::{config_error, io_error, Result};
use rowkeep_core::{DeployFlags, Session};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file; absent means the caller supplies a path
    pub path: Option<PathBuf>,
    pub foreign_keys: bool,
    pub journal_mode: Option<String>,
    pub busy_timeout_ms: Option<u64>,
    pub tables: BTreeMap<String, DeployFlags>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            journal_mode: Some("WAL".to_string()),
            busy_timeout_ms: None,
            tables: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: StoreConfig = serde_yaml::from_str(text)
            .map_err(|e| config_error(format!("Invalid store configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| io_error(&path.display().to_string(), e))?;
        Self::from_yaml_str(&text)
    }

    /// Register every table override with `session`
    pub fn apply_to(&self, session: &mut Session) {
        for (table, flags) in &self.tables {
            session.override_deploy_flags(table.clone(), *flags);
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(mode) = &self.journal_mode {
            const MODES: [&str; 6] = ["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
            if !MODES.iter().any(|m| m.eq_ignore_ascii_case(mode)) {
                return Err(config_error(format!("Unknown journal_mode {}", mode)));
            }
        }
        if let Some(blank) = self.tables.keys().find(|t| t.trim().is_empty()) {
            return Err(config_error(format!(
                "Table override with blank name {:?}",
                blank
            )));
        }
        Ok(())
    }
}
