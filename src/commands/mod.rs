//! CLI subcommand implementations

pub mod append;
pub mod import;
pub mod show;

use anyhow::Result;
use trade_recon::Config;

/// Load the config file when given, otherwise fall back to defaults
pub fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => {
            let config = Config::from_file(&path)?;
            tracing::info!("Loaded configuration from: {path}");
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Database path: explicit flag wins over the config value
pub fn resolve_db_path(db_override: Option<String>, config: &Config) -> String {
    db_override.unwrap_or_else(|| config.storage.db_path.clone())
}
