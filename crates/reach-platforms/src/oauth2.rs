use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::error::PlatformResult;
use crate::http::read_json;

/// Tokens are treated as expired this long before the vendor's deadline.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Successful response from an OAuth2 token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenGrant {
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| issued_at + Duration::seconds(secs))
    }
}

/// Whether a stored access token should be refreshed before use. Tokens
/// without a known expiry are assumed valid.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_some_and(|at| at - Duration::seconds(EXPIRY_SKEW_SECS) <= now)
}

/// POST a form to a token endpoint, optionally authenticating the client
/// with HTTP basic auth.
pub(crate) async fn request_token(
    http: &reqwest::Client,
    platform: &'static str,
    url: &str,
    form: &[(&str, &str)],
    client_auth: Option<(&str, &str)>,
) -> PlatformResult<TokenGrant> {
    let mut req = http.post(url).form(form);
    if let Some((id, secret)) = client_auth {
        req = req.basic_auth(id, Some(secret));
    }

    let grant: TokenGrant = read_json(platform, req.send().await?).await?;
    debug!(platform, expires_in = ?grant.expires_in, "token grant received");
    Ok(grant)
}
