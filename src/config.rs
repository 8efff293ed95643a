// src/config.rs

//! Configuration loading utilities.
//!
//! Secrets never need to live in the TOML file: any credential, webhook or
//! token written as `env:NAME` is replaced by the value of the `NAME`
//! environment variable at load time.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, StoreConfig};

const ENV_PREFIX: &str = "env:";

/// Load, resolve and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load(path)
        .map_err(|e| AppError::config(format!("Failed to load {}: {e}", path.display())))?;
    resolve_secrets(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;
    log::debug!(
        "Loaded configuration from {} ({} cohorts)",
        path.display(),
        config.cohorts.len()
    );
    Ok(config)
}

/// Replace every `env:NAME` value with the result of `lookup(NAME)`.
pub fn resolve_secrets<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    resolve(&mut config.portal.execution_token, &lookup)?;

    if let StoreConfig::Supabase { url, key, .. } = &mut config.store {
        resolve(url, &lookup)?;
        resolve(key, &lookup)?;
    }

    for cohort in &mut config.cohorts {
        resolve(&mut cohort.username, &lookup)?;
        resolve(&mut cohort.password, &lookup)?;
        resolve(&mut cohort.webhook, &lookup)?;
    }
    Ok(())
}

fn resolve<F>(value: &mut String, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(name) = value.strip_prefix(ENV_PREFIX) {
        let name = name.trim();
        *value = lookup(name).ok_or_else(|| {
            AppError::config(format!("Environment variable {name} is not set"))
        })?;
    }
    Ok(())
}
