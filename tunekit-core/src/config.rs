//! Configuration types for tunekit.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> explicit file -> environment.

use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuneConfig {
    /// Model loading arguments.
    #[serde(default)]
    pub model: ModelArguments,
    /// Dataset selection.
    #[serde(default)]
    pub data: DataArguments,
    /// Fine-tuning method.
    #[serde(default)]
    pub finetuning: FinetuningArguments,
    /// Accelerator overrides.
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Where the model comes from and how to reach it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelArguments {
    /// Local path or Hub repository id of the base model.
    #[serde(default)]
    pub model_name_or_path: String,
    /// Directory for downloaded checkpoint files.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Access token for private Hub repositories.
    #[serde(default)]
    pub hf_hub_token: Option<String>,
}

/// Datasets used for fine-tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataArguments {
    /// Comma-separated dataset names.
    #[serde(default)]
    pub dataset: String,
}

impl DataArguments {
    /// Dataset names, trimmed, empty entries dropped.
    pub fn dataset_list(&self) -> Vec<String> {
        self.dataset
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Which parameters are trained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinetuningType {
    #[default]
    Lora,
    Freeze,
    Full,
}

/// Fine-tuning method configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinetuningArguments {
    #[serde(default)]
    pub finetuning_type: FinetuningType,
}

/// Accelerator overrides. Unset fields are detected at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Number of visible accelerators.
    #[serde(default)]
    pub visible_accelerators: Option<usize>,
    /// Memory per accelerator in GiB.
    #[serde(default)]
    pub memory_gb: Option<f64>,
}

/// Path of the workspace-level configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".tunekit").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `TUNEKIT_`)
/// 2. Explicit config file
/// 3. Workspace-local config (`.tunekit/config.toml`)
/// 4. User config (`~/.config/tunekit/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<TuneConfig> {
    let mut figment = Figment::from(Serialized::defaults(TuneConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "tunekit", "tunekit") {
        let user_config = dirs.config_dir().join("config.toml");
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

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // TUNEKIT_MODEL__CACHE_DIR, TUNEKIT_DEVICE__VISIBLE_ACCELERATORS, etc.
    figment = figment.merge(Env::prefixed("TUNEKIT_").split("__"));

    Ok(figment.extract().map_err(Box::new)?)
}
