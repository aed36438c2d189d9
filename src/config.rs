use std::env;
use std::str::FromStr;

use crate::models::QuotaLimits;
use crate::rate_limit::{Operation, PostLimitConfig, RateLimitRule};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_path: String,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    /// Key used to sign and verify bearer tokens
    pub app_secret_key: String,
    /// Pre-shared secret presented by the scheduler that runs the deletion sweep
    pub cron_secret: String,
    /// Durable rate-limit backend; the embedded database is used when unset
    pub redis_url: Option<String>,
    pub backend_timeout_ms: u64,
    pub rate_limit_reprobe_secs: u64,
    pub register_limit: RateLimitRule,
    pub create_entry_limit: RateLimitRule,
    pub publish_limit: RateLimitRule,
    pub delete_limit: RateLimitRule,
    pub account_deletion_limit: RateLimitRule,
    pub post_limits: PostLimitConfig,
    pub quota: QuotaLimits,
    pub safety_score_ceiling: u8,
    pub log_requests: bool,
}

/// Read an environment variable, falling back to `default` when unset
fn env_or<T: FromStr>(key: &str, default: &str) -> Result<T, String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| format!("Invalid {}", key))
}

fn rule_from_env(prefix: &str, requests: &str, window_secs: &str) -> Result<RateLimitRule, String> {
    Ok(RateLimitRule {
        max: env_or(&format!("RATE_LIMIT_{}_REQUESTS", prefix), requests)?,
        window_secs: env_or(&format!("RATE_LIMIT_{}_WINDOW_SECS", prefix), window_secs)?,
    })
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env_or("SERVER_PORT", "8080")?;

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/murmur.db".to_string());

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let app_secret_key = env::var("APP_SECRET_KEY")
            .map_err(|_| "APP_SECRET_KEY must be set for token signing")?;

        let cron_secret = env::var("CRON_SECRET")
            .map_err(|_| "CRON_SECRET must be set for the deletion sweep endpoint")?;

        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());

        let post_limits = PostLimitConfig {
            max_per_minute: env_or("POST_MAX_PER_MINUTE", "2")?,
            burst_allowance: env_or("POST_BURST_ALLOWANCE", "5")?,
            max_per_hour: env_or("POST_MAX_PER_HOUR", "15")?,
            max_per_day: env_or("POST_MAX_PER_DAY", "50")?,
        };

        let quota = QuotaLimits {
            public_post_deletions: env_or("PUBLIC_DELETION_LIMIT", "5")?,
            permanent_deletions: env_or("PERMANENT_DELETION_LIMIT", "3")?,
        };

        Ok(Config {
            server_host,
            server_port,
            database_path,
            allowed_origins,
            environment,
            app_secret_key,
            cron_secret,
            redis_url,
            backend_timeout_ms: env_or("BACKEND_TIMEOUT_MS", "500")?,
            rate_limit_reprobe_secs: env_or("RATE_LIMIT_REPROBE_SECS", "60")?,
            register_limit: rule_from_env("REGISTER", "5", "300")?,
            create_entry_limit: rule_from_env("CREATE_ENTRY", "30", "60")?,
            publish_limit: rule_from_env("PUBLISH_ENTRY", "20", "60")?,
            delete_limit: rule_from_env("DELETE_ENTRY", "20", "60")?,
            account_deletion_limit: rule_from_env("ACCOUNT_DELETION", "5", "3600")?,
            post_limits,
            quota,
            safety_score_ceiling: env_or("SAFETY_SCORE_CEILING", "40")?,
            log_requests: env_or("LOG_REQUESTS", "false")?,
        })
    }

    /// Get server address as string
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Fixed-window rule for a logical operation
    pub fn rule_for(&self, operation: Operation) -> RateLimitRule {
        match operation {
            Operation::Register => self.register_limit,
            Operation::CreateEntry => self.create_entry_limit,
            Operation::PublishEntry => self.publish_limit,
            Operation::DeleteEntry => self.delete_limit,
            Operation::AccountDeletion => self.account_deletion_limit,
        }
    }
}
