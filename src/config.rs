use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the ShareLink backend API (e.g. `https://sharelink.example/api`)
    pub api_base: Url,
    /// Where the bearer token is persisted between invocations
    pub token_path: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let api_base = std::env::var("SHARELINK_API_BASE")
            .unwrap_or_else(|_| "http://localhost:8080/api".to_string());

        let token_path = std::env::var("SHARELINK_TOKEN_PATH")
            .unwrap_or_else(|_| "./.sharelink/token".to_string());

        let api_base = Url::parse(api_base.trim_end_matches('/')).map_err(|e| {
            ConfigError::ValidationError(format!("SHARELINK_API_BASE is not a valid URL: {e}"))
        })?;

        let config = Config {
            api_base,
            token_path,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.cannot_be_a_base() {
            return Err(ConfigError::ValidationError(
                "SHARELINK_API_BASE must be an absolute http(s) URL".to_string(),
            ));
        }

        if self.token_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "SHARELINK_TOKEN_PATH cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
