//! API server configuration.
//!
//! Loaded once at startup, in layers, later layers winning:
//!
//! 1. built-in defaults
//! 2. `tally.toml` in the working directory (optional)
//! 3. `TALLY_*` environment variables, `__` between nested keys
//!    (`TALLY_BOOTSTRAP_ADMIN__EMAIL`)
//!
//! ```toml
//! port = 5000
//! jwt_secret = "at-least-thirty-two-bytes-of-secret-material"
//! cors_origins = ["http://localhost:5173"]
//!
//! [permissions]
//! accountant = ["view_purchases", "create_purchases", "view_reports", "manage_vendors"]
//! ```

use std::collections::HashMap;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use tally_core::PermissionTable;

/// Shortest accepted HMAC secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Interface to bind
    pub host: String,

    /// HTTP port
    pub port: u16,

    /// SQLite path or `sqlite://` URL
    pub database_url: String,

    pub database_max_connections: u32,

    /// HMAC secret for session tokens. Required.
    #[serde(default)]
    pub jwt_secret: String,

    /// Session token lifetime
    pub jwt_expiry_hours: i64,

    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,

    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// First administrator, created when there are no users yet.
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,

    /// Role → permission names, replacing the default grants of that role.
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl ApiConfig {
    /// Loads the file and environment layers over the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = defaults()?
            .add_source(File::with_name("tally").required(false))
            .add_source(
                Environment::with_prefix("TALLY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors_origins"),
            )
            .build()?;
        Self::from_settings(settings)
    }

    /// Defaults plus one TOML document. Environment variables are not read.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings = defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self, ConfigError> {
        let config: ApiConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt_secret".to_string()));
        }
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue {
                key: "jwt_secret".to_string(),
                reason: format!("must be at least {MIN_JWT_SECRET_LEN} bytes"),
            });
        }
        if self.jwt_expiry_hours <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "jwt_expiry_hours".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.database_max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "database_max_connections".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The role table with this config's overrides applied.
    pub fn permission_table(&self) -> Result<PermissionTable, ConfigError> {
        PermissionTable::with_overrides(&self.permissions).map_err(|e| ConfigError::InvalidValue {
            key: "permissions".to_string(),
            reason: e.to_string(),
        })
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("host", "0.0.0.0")?
        .set_default("port", 5000)?
        .set_default("database_url", "./tally.db")?
        .set_default("database_max_connections", 5)?
        .set_default("jwt_expiry_hours", 24)?
        .set_default("log_level", "info")?)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "jwt_secret = \"0123456789abcdef0123456789abcdef\"";

    #[test]
    fn test_defaults_fill_everything_but_the_secret() {
        let config = ApiConfig::from_toml(SECRET).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.database_url, "./tally.db");
        assert_eq!(config.jwt_expiry_hours, 24);
        assert_eq!(config.log_level, "info");
        assert!(config.cors_origins.is_empty());
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_secret_is_required_and_long() {
        let err = ApiConfig::from_toml("").unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired(ref key) if key == "jwt_secret"));

        let err = ApiConfig::from_toml("jwt_secret = \"short\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "jwt_secret"));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let toml = format!(
            "{SECRET}\nport = 8080\ncors_origins = [\"http://localhost:5173\"]\n\n\
             [bootstrap_admin]\nfirst_name = \"Ada\"\nlast_name = \"Admin\"\n\
             email = \"ada@example.com\"\npassword = \"changeme\"\n"
        );
        let config = ApiConfig::from_toml(&toml).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.bootstrap_admin.unwrap().email, "ada@example.com");
    }

    #[test]
    fn test_unknown_permission_override_is_rejected() {
        let toml = format!("{SECRET}\n[permissions]\nuser = [\"fly\"]\n");
        let config = ApiConfig::from_toml(&toml).unwrap();
        let err = config.permission_table().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "permissions"));
    }
}
