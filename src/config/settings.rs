//! Runtime settings loaded once from the environment at startup.
//!
//! Every value has a default so a bare `cargo run` works against a local
//! `SQLite` file. Values that fail to parse are a configuration error rather
//! than a silent fallback.

use crate::errors::{Error, Result};
use chrono::{Duration, NaiveTime};
use rust_decimal::Decimal;
use std::{env, fmt::Display, path::PathBuf, str::FromStr};
use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/budget_canteen.sqlite?mode=rwc";

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// sea-orm connection string
    pub database_url: String,
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Key used to sign bearer tokens
    pub token_secret: String,
    /// Lifetime of access tokens
    pub access_token_ttl: Duration,
    /// Lifetime of refresh tokens
    pub refresh_token_ttl: Duration,
    /// Origins allowed by CORS; empty allows any origin
    pub cors_allowed_origins: Vec<String>,
    /// Where invoice documents are written
    pub invoice_dir: PathBuf,
    /// Sender address of confirmation emails
    pub mail_from: String,
    /// Same-day cutoff when no order window is configured
    pub default_order_cutoff: NaiveTime,
    /// Same-day cutoff of the public ordering page
    pub public_order_cutoff: NaiveTime,
    /// Highest dish price covered by the canteen; the rest is a supplement
    pub subsidy_price_ceiling: Decimal,
    /// Seed file for categories and order windows
    pub seed_config: PathBuf,
    /// Bootstrap superuser name
    pub admin_username: Option<String>,
    /// Bootstrap superuser password
    pub admin_password: Option<String>,
}

impl Settings {
    /// Loads settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a closure over a map instead of
    /// mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token_secret = lookup("TOKEN_SECRET").unwrap_or_else(|| {
            warn!("TOKEN_SECRET not set, generating an ephemeral key; tokens will not survive a restart");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        });

        let access_minutes: i64 = parse_or(&lookup, "ACCESS_TOKEN_TTL_MINUTES", 60)?;
        let refresh_hours: i64 = parse_or(&lookup, "REFRESH_TOKEN_TTL_HOURS", 24)?;
        if access_minutes <= 0 || refresh_hours <= 0 {
            return Err(Error::Config {
                message: "Token lifetimes must be positive".to_string(),
            });
        }

        let subsidy_price_ceiling: Decimal =
            parse_or(&lookup, "SUBSIDY_PRICE_CEILING", Decimal::from(30_000))?;
        if subsidy_price_ceiling <= Decimal::ZERO {
            return Err(Error::Config {
                message: "SUBSIDY_PRICE_CEILING must be positive".to_string(),
            });
        }

        Ok(Self {
            database_url: string_or(&lookup, "DATABASE_URL", DEFAULT_DATABASE_URL),
            bind_addr: string_or(&lookup, "BIND_ADDR", "0.0.0.0:8000"),
            token_secret,
            access_token_ttl: Duration::minutes(access_minutes),
            refresh_token_ttl: Duration::hours(refresh_hours),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            invoice_dir: PathBuf::from(string_or(&lookup, "INVOICE_DIR", "data/invoices")),
            mail_from: string_or(&lookup, "MAIL_FROM", "cantine@localhost"),
            default_order_cutoff: time_or(&lookup, "DEFAULT_ORDER_CUTOFF", "13:00")?,
            public_order_cutoff: time_or(&lookup, "PUBLIC_ORDER_CUTOFF", "12:30")?,
            subsidy_price_ceiling,
            seed_config: PathBuf::from(string_or(&lookup, "SEED_CONFIG", "config.toml")),
            admin_username: lookup("ADMIN_USERNAME"),
            admin_password: lookup("ADMIN_PASSWORD"),
        })
    }
}

fn string_or<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| Error::Config {
            message: format!("Invalid {key} value {raw:?}: {e}"),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn time_or<F>(lookup: &F, key: &str, default: &str) -> Result<NaiveTime>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = string_or(lookup, key, default);
    parse_time(&raw).ok_or_else(|| Error::Config {
        message: format!("Invalid {key} value {raw:?}: expected HH:MM"),
    })
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}
