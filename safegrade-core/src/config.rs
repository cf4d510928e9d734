//! Configuration for Safegrade runners.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment.
//! Configuration is loaded from `~/.config/safegrade/config.toml` and/or
//! `.safegrade/config.toml` in the workspace directory.

use crate::aggregate::Evaluator;
use crate::error::{ConfigError, SafegradeError};
use crate::framework::Framework;
use crate::overrides::OverrideRegistry;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafegradeConfig {
    /// Framework file (category weights, grade table).
    pub framework: Option<PathBuf>,
    /// Critical failure override registry. No overrides when unset.
    pub overrides: Option<PathBuf>,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Output formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Pretty-print JSON output.
    pub pretty: bool,
}

/// Log file settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write JSON logs to a daily rolling file.
    pub file: bool,
    /// Directory for log files (platform data dir when unset).
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            dir: None,
        }
    }
}

impl SafegradeConfig {
    /// Load the configured framework and override registry.
    pub fn evaluator(&self) -> Result<Evaluator, SafegradeError> {
        let framework_path = self
            .framework
            .as_deref()
            .ok_or(ConfigError::MissingFramework)?;
        let framework = Framework::load(framework_path)?;
        let registry = match self.overrides.as_deref() {
            Some(path) => OverrideRegistry::load(path)?,
            None => OverrideRegistry::default(),
        };
        Ok(Evaluator::new(framework, registry))
    }

    /// Resolved log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.logging
            .dir
            .clone()
            .or_else(|| project_dirs().map(|d| d.data_dir().join("logs")))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "safegrade", "safegrade")
}

fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".safegrade").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `SAFEGRADE_`)
/// 2. Explicit config file (`--config`)
/// 3. Workspace-local config (`.safegrade/config.toml`)
/// 4. User config (`~/.config/safegrade/config.toml`)
/// 5. Built-in defaults
///
/// Command-line flags are applied by the caller on top of the result.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<SafegradeConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(SafegradeConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // SAFEGRADE_FRAMEWORK, SAFEGRADE_OUTPUT__PRETTY, etc.
    figment = figment.merge(Env::prefixed("SAFEGRADE_").split("__"));

    figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
}
