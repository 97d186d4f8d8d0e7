use std::str::FromStr;

use anyhow::{Context, Result};

use crate::resolver::ResolverConfig;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    /// Unset disables the semantic resolver tier.
    pub embedding_api_url: Option<String>,
    pub embedding_api_key: Option<String>,
    pub embedding_model: String,
    pub resolver: ResolverConfig,
    pub taxonomy_refresh_secs: u64,
    pub experience_backfill_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let resolver = ResolverConfig {
            fuzzy_threshold: parse_env("FUZZY_THRESHOLD", 0.8)?,
            semantic_accept_threshold: parse_env("SEMANTIC_ACCEPT_THRESHOLD", 0.85)?,
            semantic_suggest_threshold: parse_env("SEMANTIC_SUGGEST_THRESHOLD", 0.70)?,
            record_auto_accepted: parse_env("RECORD_AUTO_ACCEPTED", true)?,
        };
        validate_thresholds(&resolver)?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            embedding_api_url: optional_env("EMBEDDING_API_URL"),
            embedding_api_key: optional_env("EMBEDDING_API_KEY"),
            embedding_model: optional_env("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            resolver,
            taxonomy_refresh_secs: parse_env("TAXONOMY_REFRESH_SECS", 300)?,
            experience_backfill_secs: parse_env("EXPERIENCE_BACKFILL_SECS", 86_400)?,
        })
    }
}

fn validate_thresholds(r: &ResolverConfig) -> Result<()> {
    for (name, value) in [
        ("FUZZY_THRESHOLD", r.fuzzy_threshold),
        ("SEMANTIC_ACCEPT_THRESHOLD", r.semantic_accept_threshold),
        ("SEMANTIC_SUGGEST_THRESHOLD", r.semantic_suggest_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("{name} must be between 0 and 1, got {value}");
        }
    }
    if r.semantic_suggest_threshold > r.semantic_accept_threshold {
        anyhow::bail!("SEMANTIC_SUGGEST_THRESHOLD cannot exceed SEMANTIC_ACCEPT_THRESHOLD");
    }
    Ok(())
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
