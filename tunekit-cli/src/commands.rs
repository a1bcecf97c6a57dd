//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use std::path::Path;
use tunekit_core::config::workspace_config_path;
use tunekit_core::{
    AcceleratorProbe, SystemAccelerators, TuneConfig, current_device, get_modelcard_args,
    load_config, load_valuehead_params,
};

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Device => handle_device(&load(workspace, config_path)?),
        Commands::Vhead {
            path_or_repo_id,
            cache_dir,
        } => handle_vhead(&load(workspace, config_path)?, &path_or_repo_id, cache_dir),
        Commands::Modelcard => handle_modelcard(&load(workspace, config_path)?),
        Commands::Config { action } => handle_config(action, workspace, config_path),
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<TuneConfig> {
    load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn handle_device(config: &TuneConfig) -> anyhow::Result<()> {
    let probe = SystemAccelerators::from_config(&config.device);
    println!("Visible accelerators: {}", probe.device_count());
    for ordinal in 0..probe.device_count() {
        match probe.total_memory(ordinal) {
            Some(bytes) => println!("  cuda:{ordinal}  {:.1} GiB", bytes as f64 / 1024f64.powi(3)),
            None => println!("  cuda:{ordinal}  memory unknown"),
        }
    }
    println!("Current device: {}", current_device(&probe));
    Ok(())
}

fn handle_vhead(
    config: &TuneConfig,
    path_or_repo_id: &str,
    cache_dir: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let mut model_args = config.model.clone();
    if cache_dir.is_some() {
        model_args.cache_dir = cache_dir;
    }

    match load_valuehead_params(path_or_repo_id, &model_args) {
        Some(params) => {
            println!("Value head found in {path_or_repo_id}");
            for (name, tensor) in [
                ("v_head.summary.weight", &params.weight),
                ("v_head.summary.bias", &params.bias),
            ] {
                println!("  {name:<22} {:?}  {:?}", tensor.dims(), tensor.dtype());
            }
        }
        None => println!("No value head in {path_or_repo_id}"),
    }
    Ok(())
}

fn handle_modelcard(config: &TuneConfig) -> anyhow::Result<()> {
    let card = get_modelcard_args(&config.model, &config.data, &config.finetuning);
    println!("{}", serde_json::to_string_pretty(&card)?);
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let toml_str = toml::to_string_pretty(&TuneConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
