use std::{env, net::SocketAddr};

use thiserror::Error;
use url::Url;

use super::server_bind_address;

pub const DEFAULT_TABLE: &str = "id_upload_requests";
pub const DEFAULT_IMAGE_BUCKET: &str = "id-verification";
pub const DEFAULT_PLACEHOLDER_IMAGE_URL: &str = "https://placehold.co/320x200?text=No+Image";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub store: StoreConfig,
}

/// Location and credentials of the remote record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Project root, always ending in `/`.
    pub url: Url,
    /// REST endpoint under [`StoreConfig::url`].
    pub rest_url: Url,
    pub api_key: String,
    pub table: String,
    /// Prefix joined with stored image paths.
    pub image_base_url: Url,
    pub placeholder_image_url: String,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let store = StoreConfig::from_env()?;

        Ok(Self {
            bind_addr,
            environment,
            store,
        })
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = parse_url("STORE_URL", &with_trailing_slash(&required("STORE_URL")?))?;
        let api_key = required("STORE_API_KEY")?;
        let table = optional("STORE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
        let rest_url = url
            .join("rest/v1/")
            .map_err(|source| ConfigError::InvalidUrl {
                var: "STORE_URL",
                source,
            })?;

        let image_base_url = match optional("IMAGE_BASE_URL") {
            Some(value) => parse_url("IMAGE_BASE_URL", &with_trailing_slash(&value))?,
            None => {
                let bucket =
                    optional("IMAGE_BUCKET").unwrap_or_else(|| DEFAULT_IMAGE_BUCKET.to_string());
                url.join(&format!("storage/v1/object/public/{bucket}/"))
                    .map_err(|source| ConfigError::InvalidUrl {
                        var: "IMAGE_BUCKET",
                        source,
                    })?
            }
        };
        let placeholder_image_url = optional("PLACEHOLDER_IMAGE_URL")
            .unwrap_or_else(|| DEFAULT_PLACEHOLDER_IMAGE_URL.to_string());

        Ok(Self {
            url,
            rest_url,
            api_key,
            table,
            image_base_url,
            placeholder_image_url,
        })
    }
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    optional(var).ok_or(ConfigError::Missing(var))
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { var, source })
}

fn with_trailing_slash(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{value}/")
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_ENV must be one of 'development', 'production', or 'test' (got {0})")]
    InvalidEnvironment(String),
    #[error("invalid APP_BIND_ADDR value: {0}")]
    BindAddress(std::net::AddrParseError),
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid {var} value: {source}")]
    InvalidUrl {
        var: &'static str,
        source: url::ParseError,
    },
}
