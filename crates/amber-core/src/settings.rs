//! Manager settings: autosave cadence and batching, hive identity.
//!
//! Loadable from TOML or RON so hosts can ship tuning files next to their
//! other data; every field has a serde default.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Master switch for the periodic autosave. Shutdown saves always run.
    pub enable_autosave: bool,

    /// Seconds of simulated time between autosave passes.
    pub autosave_interval: f32,

    /// Save operations per frame slice while `Active`. The forced shutdown
    /// drain ignores this.
    pub autosave_batch_size: u32,

    /// Numeric id of this save host; namespaces deterministic ids and the
    /// root entity collection record.
    pub hive_id: u16,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            enable_autosave: true,
            autosave_interval: 600.0,
            autosave_batch_size: 32,
            hive_id: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("toml parse failed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("ron parse failed: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl ManagerSettings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        Ok(ron::from_str(text)?)
    }
}
