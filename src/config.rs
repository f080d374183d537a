use std::env;
use std::fmt::Debug;
use thiserror::Error;

/// Default variable holding the spreadsheet id.
pub const STORE_ID_ENV: &str = "GOOGLE_SHEET_ID";

/// Supplies the store id. Consulted on every [`crate::Model`] call.
pub trait ConfigSource: Debug + Send + Sync {
    fn store_id(&self) -> Result<String, ConfigError>;
}

/// Reads the store id from an environment variable each time it is asked,
/// so a changed value is picked up without rebuilding the model.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    var: String,
}

impl EnvConfig {
    pub fn new(var: impl Into<String>) -> Self {
        EnvConfig { var: var.into() }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(STORE_ID_ENV)
    }
}

impl ConfigSource for EnvConfig {
    fn store_id(&self) -> Result<String, ConfigError> {
        env::var(&self.var).map_err(|source| ConfigError::Env {
            var: self.var.clone(),
            source,
        })
    }
}

/// A fixed store id.
#[derive(Debug, Clone)]
pub struct StaticConfig(pub String);

impl ConfigSource for StaticConfig {
    fn store_id(&self) -> Result<String, ConfigError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read store id from ${var}: {source}")]
    Env {
        var: String,
        #[source]
        source: env::VarError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_config_reads_fresh_each_call() {
        let var = "SHEETBASE_TEST_STORE_ID";
        let config = EnvConfig::new(var);

        env::remove_var(var);
        assert!(matches!(config.store_id(), Err(ConfigError::Env { .. })));

        env::set_var(var, "first");
        assert_eq!(config.store_id().unwrap(), "first");

        env::set_var(var, "second");
        assert_eq!(config.store_id().unwrap(), "second");
        env::remove_var(var);
    }

    #[test]
    fn static_config_is_returned_unchanged() {
        let config = StaticConfig("  not validated ".to_owned());
        assert_eq!(config.store_id().unwrap(), "  not validated ");
    }
}
