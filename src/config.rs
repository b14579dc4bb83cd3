use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ANALYSIS_URL: &str = "https://pandasai-production.up.railway.app/analyze";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub key_prefix: String,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Bound of the command channel feeding the queue worker
    pub capacity: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", 3000)?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            analysis: AnalysisConfig {
                url: env::var("ANALYSIS_URL").unwrap_or_else(|_| DEFAULT_ANALYSIS_URL.to_string()),
                timeout_secs: parse_var("ANALYSIS_TIMEOUT_SECS", 30)?,
            },
            storage: StorageConfig {
                s3_bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "growmax-dev-app-assets".to_string()),
                s3_region: env::var("S3_REGION").unwrap_or_else(|_| "ap-northeast-1".to_string()),
                s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
                key_prefix: env::var("S3_KEY_PREFIX").unwrap_or_else(|_| "analytics".to_string()),
                s3_access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                s3_secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            },
            queue: QueueConfig {
                capacity: parse_var("QUEUE_CAPACITY", 64)?,
            },
        })
    }
}

fn parse_var<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) => parse_value(var, &value),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
