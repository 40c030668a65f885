use std::fmt;

use anyhow::Context;
use axum::http::HeaderValue;

const DEFAULT_EXPIRES_IN: &str = "24h";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
/// Ten years; anything longer is a misconfiguration.
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// Which credential store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
    /// The single CORS origin allowed to call the API with credentials.
    pub frontend_url: HeaderValue,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match get("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        };

        let database_url = get("DATABASE_URL").filter(|v| !v.is_empty());
        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set for the postgres store");
        }

        let secret = get("JWT_SECRET")
            .filter(|v| !v.trim().is_empty())
            .context("JWT_SECRET not configured")?;
        let expires_in = get("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_EXPIRES_IN.into());
        let ttl_seconds = parse_duration_secs(&expires_in)
            .with_context(|| format!("invalid JWT_EXPIRES_IN {expires_in:?}"))?;

        let port = match get("APP_PORT") {
            Some(p) => p.parse::<u16>().context("invalid APP_PORT")?,
            None => 8080,
        };

        let frontend = get("FRONTEND_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.into());
        let frontend_url = parse_origin(&frontend)
            .with_context(|| format!("invalid FRONTEND_URL {frontend:?}"))?;

        Ok(Self {
            store,
            database_url,
            jwt: JwtConfig {
                secret,
                ttl_seconds,
            },
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            frontend_url,
        })
    }
}

/// Accepts `scheme://host[:port]` with nothing after the authority.
fn parse_origin(raw: &str) -> anyhow::Result<HeaderValue> {
    let origin = raw.trim().trim_end_matches('/');
    let (scheme, authority) = origin.split_once("://").context("missing scheme")?;
    anyhow::ensure!(
        scheme == "http" || scheme == "https",
        "scheme must be http or https"
    );
    anyhow::ensure!(
        !authority.is_empty() && !authority.contains(['/', '?', '#', ' ']),
        "origin must not carry a path"
    );
    HeaderValue::from_str(origin).context("origin is not a valid header value")
}

/// Parses lifetimes such as `90`, `45s`, `30m`, `24h` or `7d` into seconds.
pub fn parse_duration_secs(raw: &str) -> anyhow::Result<i64> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], c.to_ascii_lowercase()),
        Some(_) => (raw, 's'),
        None => anyhow::bail!("empty duration"),
    };
    let value: i64 = digits.trim().parse().context("duration is not a number")?;
    anyhow::ensure!(value > 0, "duration must be positive");
    let scale = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 60 * 60 * 24,
        other => anyhow::bail!("unknown duration unit {other:?}"),
    };
    let secs = value.checked_mul(scale).context("duration overflows")?;
    anyhow::ensure!(secs <= MAX_TTL_SECS, "duration exceeds ten years");
    Ok(secs)
}
