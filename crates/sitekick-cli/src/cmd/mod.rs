pub mod config;
pub mod migrate;
pub mod notify;
pub mod serve;

use anyhow::Context;
use sitekick_core::config::Config;
use std::path::Path;

/// Load the config file and apply environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_with_env(path).with_context(|| format!("failed to load {}", path.display()))
}
