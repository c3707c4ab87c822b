//! rollgate.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::names::{validate_label, NameError};
use crate::types::{GLOBAL_ROLLOUT_BLOCK_NAMESPACE, ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid gate config: {0}")]
    Invalid(#[from] NameError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollgateConfig {
    pub gate: GateConfig,
    pub store: StoreConfig,
    pub reconcile: ReconcileConfig,
    /// tracing `EnvFilter` directives. `RUST_LOG` wins when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

/// What the gate does when it cannot list rollout blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListErrorPolicy {
    /// Treat the unlistable namespace as having no blocks.
    #[default]
    FailOpen,
    /// Block the rollout until listing succeeds.
    FailClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Release annotation holding the override list.
    pub override_annotation: String,
    /// Namespace whose rollout blocks apply to all releases.
    pub global_namespace: String,
    pub on_list_error: ListErrorPolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            override_annotation: ROLLOUT_BLOCKS_OVERRIDE_ANNOTATION.to_string(),
            global_namespace: GLOBAL_ROLLOUT_BLOCK_NAMESPACE.to_string(),
            on_list_error: ListErrorPolicy::FailOpen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Distinct events kept per object; older ones are removed.
    pub event_retention: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/rollgate"),
            event_retention: 100,
        }
    }
}

impl StoreConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("rollgate.redb")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Seconds between reconcile passes in `rollgate run`.
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

impl RollgateConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RollgateConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_label("gate.global_namespace", &self.gate.global_namespace)?;
        if self.gate.override_annotation.trim().is_empty() {
            return Err(NameError::Empty {
                field: "gate.override_annotation",
            }
            .into());
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
