use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::Duration;
use tracing::{info, warn};

use reach_platforms::twitter::{DEFAULT_SCOPES, TwitterConsumer, TwitterOAuthConfig};
use reach_platforms::youtube::GoogleOAuthConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEFAULT_GOOGLE_SCOPES: &str = "https://www.googleapis.com/auth/youtube.readonly \
     https://www.googleapis.com/auth/yt-analytics.readonly";

/// Everything the handlers need to know about their environment. Built once
/// at startup and carried in `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Lifetime of a pending authorization handshake.
    pub oauth_state_ttl: Duration,
    /// Where the browser lands after an OAuth callback.
    pub frontend_redirect_url: String,
    /// Append a fresh `access`/`refresh` pair to the callback redirect.
    pub issue_session_on_callback: bool,
    /// Delete a platform's snapshots when it is disconnected.
    pub cascade_snapshots_on_disconnect: bool,
    pub google: GoogleOAuthConfig,
    pub youtube_api_key: String,
    pub twitter: TwitterOAuthConfig,
    pub twitter_consumer: TwitterConsumer,
}

impl Config {
    /// Defaults suitable for local development, with the given signing secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl: Duration::minutes(30),
            refresh_token_ttl: Duration::days(7),
            oauth_state_ttl: Duration::minutes(10),
            frontend_redirect_url: "http://localhost:5173/dashboard".into(),
            issue_session_on_callback: false,
            cascade_snapshots_on_disconnect: false,
            google: GoogleOAuthConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "http://localhost:8000/youtube/callback/".into(),
                scopes: split_scopes(DEFAULT_GOOGLE_SCOPES),
            },
            youtube_api_key: String::new(),
            twitter: TwitterOAuthConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "http://localhost:8000/twitter/callback/".into(),
                scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            },
            twitter_consumer: TwitterConsumer::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("REACH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("REACH_JWT_SECRET is unset or still a placeholder; set it in .env and restart");
        }

        let mut config = Self::with_secret(jwt_secret);

        config.access_token_ttl = Duration::minutes(ttl_or("REACH_ACCESS_TTL_MINUTES", 30)?);
        config.refresh_token_ttl = Duration::days(ttl_or("REACH_REFRESH_TTL_DAYS", 7)?);
        config.oauth_state_ttl = Duration::seconds(ttl_or("REACH_OAUTH_STATE_TTL_SECS", 600)?);
        config.frontend_redirect_url = var_or("REACH_FRONTEND_URL", &config.frontend_redirect_url);
        config.issue_session_on_callback = flag("REACH_ISSUE_SESSION_ON_CALLBACK", false)?;
        config.cascade_snapshots_on_disconnect = flag("REACH_CASCADE_SNAPSHOTS", false)?;

        config.google = GoogleOAuthConfig {
            client_id: required("GOOGLE_OAUTH2_CLIENT_ID"),
            client_secret: required("GOOGLE_OAUTH2_CLIENT_SECRET"),
            redirect_uri: var_or("GOOGLE_OAUTH2_REDIRECT_URI", &config.google.redirect_uri),
            scopes: split_scopes(&var_or("GOOGLE_OAUTH2_SCOPES", DEFAULT_GOOGLE_SCOPES)),
        };
        config.youtube_api_key = required("YOUTUBE_API_KEY");

        config.twitter.client_id = required("TWITTER_CLIENT_ID");
        config.twitter.client_secret = required("TWITTER_CLIENT_SECRET");
        config.twitter.redirect_uri = var_or("TWITTER_CALLBACK_URL", &config.twitter.redirect_uri);
        config.twitter_consumer = TwitterConsumer {
            key: var_or("TWITTER_CONSUMER_KEY", ""),
            secret: var_or("TWITTER_CONSUMER_SECRET", ""),
        };

        info!(
            "Config loaded: cascade_snapshots={}, session_on_callback={}, frontend={}",
            config.cascade_snapshots_on_disconnect,
            config.issue_session_on_callback,
            config.frontend_redirect_url
        );
        Ok(config)
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Vendor credentials the server can start without; the matching platform
/// simply fails at the vendor until they are set.
fn required(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        warn!("{key} not set, the dependent platform will not work");
        String::new()
    })
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("invalid {key} value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn ttl_or(key: &str, default: i64) -> Result<i64> {
    positive_ttl(key, parse_or(key, default)?)
}

/// Lifetimes end up in JWT `exp` claims, which cannot be in the past.
fn positive_ttl(key: &str, value: i64) -> Result<i64> {
    if value <= 0 {
        bail!("{key} must be greater than zero, got {value}");
    }
    Ok(value)
}

fn flag(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => bail!("invalid {key} value '{other}', expected true or false"),
        },
        Err(_) => Ok(default),
    }
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
