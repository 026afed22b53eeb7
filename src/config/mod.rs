use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: String,
    pub port: u16,
    pub database_url: String,
    pub log_level: String,
    pub request_timeout: u64,
    pub dispatch: DispatchConfig,
}

/// Background dispatch and sweep tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Interval for the scheduled-notification sweep loop
    pub scheduled_sweep_interval_secs: u64,
    /// Interval for the expired-notification sweep loop
    pub expiry_sweep_interval_secs: u64,
    /// Max notifications handled per sweep invocation
    pub sweep_batch_size: i64,
    /// Broadcast capacity of the in-app stream
    pub in_app_stream_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scheduled_sweep_interval_secs: 30,
            expiry_sweep_interval_secs: 300,
            sweep_batch_size: 100,
            in_app_stream_capacity: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            request_timeout: env::var("REQUEST_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            dispatch: DispatchConfig {
                scheduled_sweep_interval_secs: env_u64("SCHEDULED_SWEEP_INTERVAL_SECS", 30),
                expiry_sweep_interval_secs: env_u64("EXPIRY_SWEEP_INTERVAL_SECS", 300),
                sweep_batch_size: env_u64("SWEEP_BATCH_SIZE", 100) as i64,
                in_app_stream_capacity: env_u64("IN_APP_STREAM_CAPACITY", 1024) as usize,
            },
        })
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_defaults() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.scheduled_sweep_interval_secs, 30);
        assert_eq!(dispatch.sweep_batch_size, 100);
    }
}
