//! Configuration management for the query layer

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How often the background task evicts unused cache entries.
    pub gc_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
    /// Whether response bodies are checked against their DTO contracts.
    /// Explicit so that turning it off in production is a reviewed decision.
    pub validate_responses: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let validate_default = if environment == "production" { "false" } else { "true" };

        Ok(Config {
            api: ApiConfig {
                base_url: env::var("API_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:5085/api/v1".to_string()),
                request_timeout_seconds: env::var("API_REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            },
            cache: CacheConfig {
                gc_interval_seconds: env::var("QUERY_GC_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            },
            app: AppConfig {
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                validate_responses: env::var("VALIDATE_RESPONSES")
                    .unwrap_or_else(|_| validate_default.to_string())
                    .parse()?,
                environment,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.app.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:5085/api/v1".to_string(),
                request_timeout_seconds: 30,
            },
            cache: CacheConfig {
                gc_interval_seconds: 60,
            },
            app: AppConfig {
                environment: "development".to_string(),
                log_level: "info".to_string(),
                validate_responses: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates_outside_production() {
        let config = Config::default();
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(config.app.validate_responses);
        assert_eq!(config.api.request_timeout_seconds, 30);
    }
}
