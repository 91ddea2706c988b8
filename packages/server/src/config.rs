//! Configuration (C13, §4.11): a single `Config` loaded once at process
//! start via `Config::from_env()`. Grounded in the teacher's `config.rs`
//! pattern: `dotenvy::dotenv()` first so a local `.env` works in
//! development (a no-op where the file is absent), then each variable is
//! read with `anyhow::Context` describing what's missing.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openai_api_key: String,
    pub port: u16,

    /// Concurrent `process_one`/`analyze_one` fan-out per worker (§6
    /// `WORKER_POOL`, default 10).
    pub worker_pool: usize,
    /// Sleep duration when a claim/poll returns nothing (§6 `IDLE_MS`).
    pub idle_ms: u64,
    /// Endpoint lease duration held by the scheduler worker (§6
    /// `LEASE_MS`).
    pub lease_ms: i64,
    /// Age threshold before a `running` Run row is swept to `failed` (§6
    /// `ZOMBIE_AGE_MS`).
    pub zombie_age_ms: i64,
    /// How long shutdown waits for in-flight dispatches before abandoning
    /// them to the zombie sweep (§6 `SHUTDOWN_TIMEOUT_MS`).
    pub shutdown_timeout_ms: u64,

    /// Tier-floor overrides, in milliseconds. These exist for an operator
    /// to raise a tenant-wide floor without a code change; when unset the
    /// compiled-in `Tier::limits()` table governs (§4.11).
    pub tier_floor_free_ms: Option<i64>,
    pub tier_floor_pro_ms: Option<i64>,
    pub tier_floor_enterprise_ms: Option<i64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,

            worker_pool: parse_or_default("WORKER_POOL", 10)?,
            idle_ms: parse_or_default("IDLE_MS", 1_000)?,
            lease_ms: parse_or_default("LEASE_MS", 60_000)?,
            zombie_age_ms: parse_or_default("ZOMBIE_AGE_MS", 300_000)?,
            shutdown_timeout_ms: parse_or_default("SHUTDOWN_TIMEOUT_MS", 30_000)?,

            tier_floor_free_ms: parse_optional("TIER_FLOOR_FREE_MS")?,
            tier_floor_pro_ms: parse_optional("TIER_FLOOR_PRO_MS")?,
            tier_floor_enterprise_ms: parse_optional("TIER_FLOOR_ENTERPRISE_MS")?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} must be a valid number: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_optional<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key} must be a valid number: {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_default_falls_back_when_unset() {
        env::remove_var("SCHEDULER_TEST_UNSET_KEY");
        let value: u64 = parse_or_default("SCHEDULER_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_optional_is_none_when_unset() {
        env::remove_var("SCHEDULER_TEST_UNSET_OPTIONAL");
        let value: Option<i64> = parse_optional("SCHEDULER_TEST_UNSET_OPTIONAL").unwrap();
        assert_eq!(value, None);
    }
}
