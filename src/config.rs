use serde::{Deserialize, Serialize};

use crate::logic::builder::FlagDefaults;
use crate::logic::format::ValidationPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Shape of flags created from scratch.
    pub editor: FlagDefaults,
    /// Checks applied before a flag is written.
    pub validation: ValidationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional `config` file and
    /// `FLAGDESK_` environment variables, e.g. `FLAGDESK_EDITOR__FLAG_TYPE=number`.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        config = config.add_source(config::File::with_name("config").required(false));

        // Nested keys use a double underscore since field names contain single ones
        config = config.add_source(
            config::Environment::with_prefix("FLAGDESK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
