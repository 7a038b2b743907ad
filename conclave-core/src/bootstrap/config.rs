//! Configuration loading

use anyhow::{Context, Result};
use std::path::Path;

use crate::Config;

/// Load and validate configuration
///
/// Config file search order:
/// 1. `explicit` (the `--config` flag), which must exist
/// 2. `CONCLAVE_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. Fall back to environment variables only
///
/// Runs before logging is initialized, so progress goes to stderr.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    if let Some(path) = explicit {
        if !Path::new(path).exists() {
            anyhow::bail!("Config file {path} does not exist");
        }
    }

    let config_path = explicit
        .map(str::to_string)
        .or_else(|| {
            std::env::var("CONCLAVE_CONFIG_PATH")
                .ok()
                .filter(|p| Path::new(p).exists())
        })
        .or_else(|| {
            let cwd = "config.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        Config::from_file(&path).with_context(|| format!("Failed to load {path}"))?
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env().context("Failed to load config from environment")?
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        anyhow::bail!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        );
    }

    Ok(config)
}
