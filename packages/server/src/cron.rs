//! Cron expression evaluation (C2).
//!
//! A pure function over a 5-field cron expression and a reference time.
//! Kept deliberately free of scheduling side effects (no task spawning, no
//! sleeping) so the Governor can call it synchronously.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronParseError {
    #[error("invalid cron expression '{0}': {1}")]
    Invalid(String, String),
}

/// Parses `expr` and returns the first instant strictly after `from` that it
/// matches. `expr` uses standard 5-field cron syntax (minute hour day month
/// weekday); a leading `"0 "` is prepended internally because the
/// underlying engine requires a seconds field.
pub fn next(expr: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>, CronParseError> {
    let schedule = parse(expr)?;
    schedule
        .after(&from)
        .next()
        .ok_or_else(|| CronParseError::Invalid(expr.to_string(), "no future occurrence".into()))
}

/// Validates a cron expression without evaluating it. Used at endpoint
/// creation time so malformed expressions are rejected before they ever
/// reach the scheduler worker.
pub fn validate(expr: &str) -> Result<(), CronParseError> {
    parse(expr).map(|_| ())
}

fn parse(expr: &str) -> Result<Schedule, CronParseError> {
    let with_seconds = format!("0 {}", expr.trim());
    Schedule::from_str(&with_seconds)
        .map_err(|e| CronParseError::Invalid(expr.to_string(), e.to_string()))
}
