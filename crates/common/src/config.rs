//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Process-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection URL; in-memory stores are used when unset
    pub database_url: Option<String>,

    /// Tracing filter directive
    pub rust_log: String,

    /// `json` or `pretty`
    pub log_format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "crowd=info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        })
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Longest accepted token window, ten years
pub const MAX_WINDOW_HOURS: i64 = 24 * 365 * 10;

/// Longest accepted invitation lifetime, ten years
pub const MAX_INVITATION_TTL_DAYS: i64 = 365 * 10;

/// Lockout and token lifetime policy for the identity domain
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConfig {
    /// Consecutive failed sign-ins before the account is locked
    pub max_failed_attempts: i32,
    /// How long a confirmation token stays redeemable
    pub confirm_within: Duration,
    /// How long a password reset token stays redeemable
    pub reset_password_within: Duration,
    /// How long an unlock token stays redeemable; `None` means forever
    pub unlock_within: Option<Duration>,
    /// How long a team invitation stays pending
    pub invitation_ttl: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            confirm_within: Duration::hours(72),
            reset_password_within: Duration::hours(6),
            unlock_within: None,
            invitation_ttl: Duration::days(7),
        }
    }
}

impl IdentityConfig {
    /// Load identity policy from environment variables, falling back to
    /// defaults. Windows and lifetimes must be positive and at most ten years.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let max_failed_attempts: i32 =
            parse_var("MAX_FAILED_ATTEMPTS")?.unwrap_or(defaults.max_failed_attempts);
        if max_failed_attempts < 1 {
            anyhow::bail!("MAX_FAILED_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            max_failed_attempts,
            confirm_within: parse_bounded("CONFIRM_WITHIN_HOURS", MAX_WINDOW_HOURS)?
                .map(Duration::hours)
                .unwrap_or(defaults.confirm_within),
            reset_password_within: parse_bounded("RESET_PASSWORD_WITHIN_HOURS", MAX_WINDOW_HOURS)?
                .map(Duration::hours)
                .unwrap_or(defaults.reset_password_within),
            unlock_within: parse_bounded("UNLOCK_WITHIN_HOURS", MAX_WINDOW_HOURS)?
                .map(Duration::hours),
            invitation_ttl: parse_bounded("INVITATION_TTL_DAYS", MAX_INVITATION_TTL_DAYS)?
                .map(Duration::days)
                .unwrap_or(defaults.invitation_ttl),
        })
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is invalid: {}", name, e)),
        _ => Ok(None),
    }
}

/// Parse a count that must lie in `1..=max`
fn parse_bounded(name: &str, max: i64) -> Result<Option<i64>> {
    match parse_var::<i64>(name)? {
        Some(value) if !(1..=max).contains(&value) => {
            anyhow::bail!("{} must be between 1 and {}, got {}", name, max, value)
        }
        value => Ok(value),
    }
}
