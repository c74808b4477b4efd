use std::env;
use log::info;
use crate::config::{load_config, Config};
use crate::errors::ConfigError;
use crate::logging::setup_logger;

/// Reads configuration and sets up logging for the named process
///
/// The configuration file is given either as `--config=<path>` on the command line or through
/// the `CONFIG_FILE` environment variable. Without either, defaults plus environment overrides
/// are used.
///
/// # Arguments
///
/// * 'process_name' - name of the process being initialized
pub fn init(process_name: &str) -> Result<Config, ConfigError> {
    let config_path = config_path_from(env::args(), env::var("CONFIG_FILE").ok());
    let config = load_config(config_path.as_deref())?;

    setup_logger(&config.general, process_name)?;

    info!("pvcast {} version: {}", process_name, env!("CARGO_PKG_VERSION"));
    if let Some(path) = config_path {
        info!("configuration loaded from {}", path);
    }

    Ok(config)
}

/// Resolves the configuration file path, the command line takes precedence over the environment
///
/// # Arguments
///
/// * 'args' - command line arguments
/// * 'env_path' - value of the CONFIG_FILE environment variable
fn config_path_from<I: Iterator<Item = String>>(args: I, env_path: Option<String>) -> Option<String> {
    args.skip(1)
        .find_map(|a| a.strip_prefix("--config=").map(str::to_string))
        .or(env_path)
}
