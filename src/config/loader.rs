use config::{Config, Environment, File};

use crate::config::LedgerConfig;
use crate::error::{Error, Result};

impl LedgerConfig {
    /// Layered load: `config/default.toml`, then an optional per-environment
    /// file, then `MARGIN_LEDGER_*` environment overrides.
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("MARGIN_LEDGER"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))
    }
}
