use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// When set, the result cache and rate limiter live in Redis instead of process memory.
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub engine: EngineConfig,
}

/// Upper bound on content-level generation attempts per request.
const MAX_GENERATION_ATTEMPTS: u32 = 10;

/// Selection policy knobs. Defaults mirror the production values; all are
/// business policy rather than invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cache_ttl: Duration,
    pub library_cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub cache_sweep_interval: Duration,
    pub fingerprint_window: Duration,
    pub rate_limit_max_requests: u64,
    pub rate_limit_window: Duration,
    pub generation_max_attempts: u32,
    pub generation_backoff: Duration,
    pub min_generated_chars: usize,
    /// Share of a chapter's slots that must have stories before it counts as complete.
    pub chapter_completion_threshold: f64,
    /// Lost optimistic updates tolerated per selection before serving fallback.
    pub max_race_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            library_cache_ttl: Duration::from_secs(300),
            cache_max_entries: 1000,
            cache_sweep_interval: Duration::from_secs(60),
            fingerprint_window: Duration::from_secs(300),
            rate_limit_max_requests: 10,
            rate_limit_window: Duration::from_secs(60),
            generation_max_attempts: 3,
            generation_backoff: Duration::from_millis(500),
            min_generated_chars: 20,
            chapter_completion_threshold: 0.8,
            max_race_retries: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            cache_ttl: secs_env("CACHE_TTL_SECS", defaults.cache_ttl)?,
            library_cache_ttl: secs_env("LIBRARY_CACHE_TTL_SECS", defaults.library_cache_ttl)?,
            cache_max_entries: optional_env("CACHE_MAX_ENTRIES", defaults.cache_max_entries)?,
            cache_sweep_interval: secs_env(
                "CACHE_SWEEP_INTERVAL_SECS",
                defaults.cache_sweep_interval,
            )?,
            fingerprint_window: secs_env("FINGERPRINT_WINDOW_SECS", defaults.fingerprint_window)?,
            rate_limit_max_requests: optional_env(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            )?,
            rate_limit_window: secs_env("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window)?,
            generation_max_attempts: optional_env(
                "GENERATION_MAX_ATTEMPTS",
                defaults.generation_max_attempts,
            )?,
            generation_backoff: Duration::from_millis(optional_env(
                "GENERATION_BACKOFF_MS",
                defaults.generation_backoff.as_millis() as u64,
            )?),
            min_generated_chars: optional_env("MIN_GENERATED_CHARS", defaults.min_generated_chars)?,
            chapter_completion_threshold: optional_env(
                "CHAPTER_COMPLETION_THRESHOLD",
                defaults.chapter_completion_threshold,
            )?,
            max_race_retries: optional_env("MAX_RACE_RETRIES", defaults.max_race_retries)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.chapter_completion_threshold > 0.0 && self.chapter_completion_threshold <= 1.0) {
            bail!(
                "CHAPTER_COMPLETION_THRESHOLD must be in (0, 1], got {}",
                self.chapter_completion_threshold
            );
        }
        if !(1..=MAX_GENERATION_ATTEMPTS).contains(&self.generation_max_attempts) {
            bail!(
                "GENERATION_MAX_ATTEMPTS must be between 1 and {MAX_GENERATION_ATTEMPTS}, got {}",
                self.generation_max_attempts
            );
        }
        if self.cache_max_entries == 0 {
            bail!("CACHE_MAX_ENTRIES must be at least 1");
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: optional_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            engine: EngineConfig::from_env()?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn secs_env(key: &str, default: Duration) -> Result<Duration> {
    optional_env(key, default.as_secs()).map(Duration::from_secs)
}
