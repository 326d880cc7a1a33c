use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub analysis: AnalysisConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// When absent, results are kept in the process-local fallback list only
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
    pub timeout_ms: u64,
    pub queue_capacity: usize,
    pub status_retention_ms: u64,
    pub max_local_results: usize,
    pub maintenance_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// 0 disables the limiter
    pub requests_per_minute: u32,
}

impl AnalysisConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn status_retention(&self) -> Duration {
        Duration::from_millis(self.status_retention_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 300_000,
            cache_max_entries: 10_000,
            timeout_ms: 30_000,
            queue_capacity: 1024,
            status_retention_ms: 3_600_000,
            max_local_results: 1000,
            maintenance_interval_ms: 60_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = AnalysisConfig::default();

        Ok(Self {
            server: ServerConfig {
                port: parse_or(&var, "PORT", 3000)?,
                host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                cors_allowed_origins: var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            database: DatabaseConfig {
                url: var("DATABASE_URL"),
                max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 10)?,
                min_connections: parse_or(&var, "DB_MIN_CONNECTIONS", 1)?,
            },
            llm: LLMConfig {
                provider: var("LLM_PROVIDER").unwrap_or_else(|| "openai".to_string()),
                api_key: var("LLM_API_KEY").or_else(|| var("OPENAI_API_KEY")),
                model: var("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                base_url: var("LLM_BASE_URL"),
            },
            analysis: AnalysisConfig {
                cache_ttl_ms: parse_or(&var, "CACHE_TTL_MS", defaults.cache_ttl_ms)?,
                cache_max_entries: parse_or(&var, "CACHE_MAX_ENTRIES", defaults.cache_max_entries)?,
                timeout_ms: parse_or(&var, "ANALYSIS_TIMEOUT_MS", defaults.timeout_ms)?,
                queue_capacity: parse_or(&var, "QUEUE_CAPACITY", defaults.queue_capacity)?,
                status_retention_ms: parse_or(&var, "STATUS_RETENTION_MS", defaults.status_retention_ms)?,
                max_local_results: parse_or(&var, "MAX_LOCAL_RESULTS", defaults.max_local_results)?,
                maintenance_interval_ms: parse_or(
                    &var,
                    "MAINTENANCE_INTERVAL_MS",
                    defaults.maintenance_interval_ms,
                )?,
            },
            rate_limit: RateLimitConfig {
                requests_per_minute: parse_or(&var, "RATE_LIMIT_PER_MINUTE", 120)?,
            },
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
