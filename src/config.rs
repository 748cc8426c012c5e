use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::error::FixtureError;

/// Environment variable naming an optional TOML file with fixture settings
pub const CONFIG_FILE_ENV: &str = "MW_FIXTURE_CONFIG";

/// Configuration for talking to a MediaWiki/Wikibase installation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Server base URL, e.g. `http://localhost:8080`
    pub server: String,

    /// Script path appended to the server URL, e.g. `/w`
    #[serde(default)]
    pub script_path: String,

    /// Administrator account used for the root session
    #[serde(default, deserialize_with = "string_lossy")]
    pub admin_username: String,

    #[serde(default, deserialize_with = "string_lossy")]
    pub admin_password: String,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Datatype name -> property id, reused instead of creating new properties
    #[serde(default)]
    pub property_ids: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Accept scalars as strings; environment values like `12345` arrive as numbers
fn string_lossy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
        Flag(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(text) => text,
        Scalar::Signed(n) => n.to_string(),
        Scalar::Unsigned(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Flag(flag) => flag.to_string(),
    })
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:8080".to_string(),
            script_path: "/w".to_string(),
            admin_username: String::new(),
            admin_password: String::new(),
            timeout_secs: default_timeout_secs(),
            property_ids: HashMap::new(),
        }
    }
}

impl FixtureConfig {
    /// Load config from defaults, the optional `MW_FIXTURE_CONFIG` TOML file
    /// and `MW_*` environment variables, in that order of precedence
    pub fn from_env() -> Result<Self, FixtureError> {
        let mut figment = Figment::from(Serialized::defaults(FixtureConfig::default()));

        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Toml::file(path));
        }

        Self::extract(figment.merge(Env::prefixed("MW_")))
    }

    /// Extract and validate a config from an already layered figment
    pub fn extract(figment: Figment) -> Result<Self, FixtureError> {
        let config: FixtureConfig = figment
            .extract()
            .map_err(|e| FixtureError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Test configuration pointing at a local server
    pub fn for_server(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            script_path: String::new(),
            admin_username: "Admin".to_string(),
            admin_password: "adminpassword".to_string(),
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), FixtureError> {
        let server = Url::parse(&self.server).map_err(|e| {
            FixtureError::Config(format!("invalid server URL '{}': {}", self.server, e))
        })?;

        match server.scheme() {
            "http" | "https" => {}
            other => {
                return Err(FixtureError::Config(format!(
                    "unsupported server URL scheme: {other}"
                )));
            }
        }

        if self.admin_username.is_empty() || self.admin_password.is_empty() {
            return Err(FixtureError::Config(
                "admin_username and admin_password must be set".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(FixtureError::Config(
                "timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Full URL of the Action API entry point (`<server><script_path>/api.php`)
    pub fn api_endpoint(&self) -> Result<Url, FixtureError> {
        let base = format!("{}{}", self.server.trim_end_matches('/'), self.script_path);
        let endpoint = format!("{}/api.php", base.trim_end_matches('/'));
        Url::parse(&endpoint).map_err(|e| FixtureError::Config(format!("invalid API URL: {e}")))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
