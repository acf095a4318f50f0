//! Configuration loading, validation, and management for Covenant.
//!
//! Loads configuration from `~/.covenant/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest classification tier a configured default may use.
const MAX_CLASSIFICATION: u8 = 5;

/// The root configuration structure.
///
/// Maps directly to `~/.covenant/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CovenantConfig {
    /// Directory holding `contracts.jsonl` and `audit.jsonl`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Audit sink configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Purge-token signing configuration
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Default permission bundles used by the contract factory
    #[serde(default)]
    pub defaults: ContractDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Mirror every audit entry into the tracing stream
    #[serde(default = "default_true")]
    pub tracing_sink: bool,

    /// Append every audit entry to `<data_dir>/audit.jsonl`
    #[serde(default = "default_true")]
    pub jsonl_sink: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tracing_sink: true,
            jsonl_sink: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Secret used to sign deep-purge confirmation tokens.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PurgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl std::fmt::Debug for PurgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeConfig")
            .field(
                "secret",
                &match self.secret {
                    Some(_) => "[REDACTED]",
                    None => "None",
                },
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDefaults {
    /// How long an episodic contract retains memories when no explicit
    /// `retention_until` is given
    #[serde(default = "default_episodic_retention_days")]
    pub episodic_retention_days: u32,

    #[serde(default = "default_episodic_cap")]
    pub episodic_classification_cap: u8,

    #[serde(default = "default_procedural_cap")]
    pub procedural_classification_cap: u8,

    #[serde(default = "default_strategic_cap")]
    pub strategic_classification_cap: u8,

    /// Actor recorded for automated operations (expiry sweeps, heuristic
    /// invalidation)
    #[serde(default = "default_system_actor")]
    pub system_actor: String,
}

fn default_episodic_retention_days() -> u32 {
    30
}
fn default_episodic_cap() -> u8 {
    3
}
fn default_procedural_cap() -> u8 {
    3
}
fn default_strategic_cap() -> u8 {
    4
}
fn default_system_actor() -> String {
    "system".into()
}

impl Default for ContractDefaults {
    fn default() -> Self {
        Self {
            episodic_retention_days: default_episodic_retention_days(),
            episodic_classification_cap: default_episodic_cap(),
            procedural_classification_cap: default_procedural_cap(),
            strategic_classification_cap: default_strategic_cap(),
            system_actor: default_system_actor(),
        }
    }
}

impl CovenantConfig {
    /// Load configuration from the default path (~/.covenant/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `COVENANT_DATA_DIR`
    /// - `COVENANT_PURGE_SECRET`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("COVENANT_DATA_DIR").filter(|d| !d.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(secret) = lookup("COVENANT_PURGE_SECRET").filter(|s| !s.is_empty()) {
            self.purge.secret = Some(secret);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".covenant")
    }

    /// The effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    pub fn contracts_path(&self) -> PathBuf {
        self.data_dir().join("contracts.jsonl")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir().join("audit.jsonl")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.defaults;
        for (name, cap) in [
            ("episodic_classification_cap", d.episodic_classification_cap),
            ("procedural_classification_cap", d.procedural_classification_cap),
            ("strategic_classification_cap", d.strategic_classification_cap),
        ] {
            if cap > MAX_CLASSIFICATION {
                return Err(ConfigError::ValidationError(format!(
                    "defaults.{name} must be between 0 and {MAX_CLASSIFICATION}, got {cap}"
                )));
            }
        }

        if d.episodic_retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "defaults.episodic_retention_days must be > 0".into(),
            ));
        }

        if d.system_actor.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "defaults.system_actor cannot be empty".into(),
            ));
        }

        if matches!(&self.purge.secret, Some(s) if s.is_empty()) {
            return Err(ConfigError::ValidationError(
                "purge.secret cannot be empty when set".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
