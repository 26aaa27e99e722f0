use chrono::NaiveDate;
use std::{env, time::Duration};

/// Booking days the clinic is closed when `UNAVAILABLE_DAYS` is not set.
pub const DEFAULT_UNAVAILABLE_DAYS: &str = "2025-10-18,2025-10-19,2025-10-25,2025-10-26";

/// Server-side sessions idle longer than this are dropped.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24;

/// AppConfig
///
/// Holds the application's configuration. Immutable once loaded and pulled into
/// handlers and middleware through `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` runs the in-memory repository (local only).
    pub db_url: Option<String>,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Runtime environment marker. Controls log format and cookie defaults.
    pub env: Env,
    // Idle lifetime of a server-side session.
    pub session_ttl: Duration,
    // Adds the `Secure` attribute to every cookie the server issues.
    pub cookie_secure: bool,
    // When false, identities rebuilt from cookies take their name and role from
    // the credential store instead of the `usuario_nombre`/`usuario_rol` cookies.
    pub trust_role_cookie: bool,
    // Dates on which appointments cannot be booked.
    pub unavailable_days: Vec<NaiveDate>,
}

/// Env
///
/// Runtime context: local development or production.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking values for test state setup.
    fn default() -> Self {
        Self {
            db_url: None,
            bind_addr: "127.0.0.1:3000".to_string(),
            env: Env::Local,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            cookie_secure: false,
            trust_role_cookie: true,
            unavailable_days: parse_days(DEFAULT_UNAVAILABLE_DAYS)
                .expect("default unavailable days are valid dates"),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables at startup.
    ///
    /// # Panics
    /// Panics when a variable required by the current environment is missing or
    /// malformed, so the server never starts half-configured.
    pub fn load() -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = match env {
            Env::Production => Some(
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
            ),
            Env::Local => env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
        };

        let session_ttl = env::var("SESSION_TTL_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .expect("FATAL: SESSION_TTL_SECS must be a number of seconds")
            })
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let cookie_secure = env::var("COOKIE_SECURE")
            .map(|raw| parse_flag(&raw).expect("FATAL: COOKIE_SECURE must be true or false"))
            .unwrap_or(env == Env::Production);

        let trust_role_cookie = env::var("TRUST_ROLE_COOKIE")
            .map(|raw| parse_flag(&raw).expect("FATAL: TRUST_ROLE_COOKIE must be true or false"))
            .unwrap_or(true);

        let unavailable_days = parse_days(
            &env::var("UNAVAILABLE_DAYS").unwrap_or_else(|_| DEFAULT_UNAVAILABLE_DAYS.to_string()),
        )
        .expect("FATAL: UNAVAILABLE_DAYS must be a comma separated list of YYYY-MM-DD dates");

        Self {
            db_url,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            env,
            session_ttl: Duration::from_secs(session_ttl),
            cookie_secure,
            trust_role_cookie,
            unavailable_days,
        }
    }

    pub fn is_unavailable(&self, day: NaiveDate) -> bool {
        self.unavailable_days.contains(&day)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Parses a comma separated list of ISO dates. Blank entries are skipped.
pub fn parse_days(raw: &str) -> Result<Vec<NaiveDate>, chrono::ParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|day| !day.is_empty())
        .map(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d"))
        .collect()
}
