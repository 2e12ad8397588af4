//! Twitter/X: OAuth2 with PKCE against API v2, and the legacy OAuth1 user
//! token path against API v1.1.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{PlatformError, PlatformResult};
use crate::http::{self, read_json};
use crate::metrics::RECENT_POST_LIMIT;
use crate::oauth1::{self, OAuth1Keys};
use crate::oauth2::{TokenGrant, request_token};

const PLATFORM: &str = "twitter";

pub const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
pub const API_BASE: &str = "https://api.twitter.com";

pub const DEFAULT_SCOPES: &[&str] = &[
    "tweet.read",
    "users.read",
    "follows.read",
    "like.read",
    "list.read",
    "offline.access",
];

#[derive(Debug, Clone)]
pub struct TwitterOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Consumer (application) key pair used to sign OAuth1 requests.
#[derive(Debug, Clone, Default)]
pub struct TwitterConsumer {
    pub key: String,
    pub secret: String,
}

pub fn authorization_url(
    config: &TwitterOAuthConfig,
    state: &str,
    code_challenge: &str,
) -> PlatformResult<String> {
    let scope = config.scopes.join(" ");
    let url = reqwest::Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| PlatformError::malformed(PLATFORM, e))?;
    Ok(url.into())
}

#[derive(Debug, Clone)]
pub enum TwitterAuth {
    Bearer(String),
    OAuth1 { token: String, token_secret: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TweetMetrics {
    pub likes: i64,
    pub retweets: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TwitterReport {
    pub username: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub tweet_count: i64,
    pub listed_count: i64,
    /// Most recent tweets, newest first, at most `RECENT_POST_LIMIT`.
    pub tweets: Vec<TweetMetrics>,
}

#[async_trait]
pub trait TwitterApi: Send + Sync {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> PlatformResult<TokenGrant>;

    async fn refresh_access_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant>;

    async fn fetch_profile(&self, auth: &TwitterAuth) -> PlatformResult<TwitterReport>;
}

pub struct TwitterClient {
    http: reqwest::Client,
    oauth: TwitterOAuthConfig,
    consumer: TwitterConsumer,
    api_base: String,
}

impl TwitterClient {
    pub fn new(oauth: TwitterOAuthConfig, consumer: TwitterConsumer) -> PlatformResult<Self> {
        Ok(Self {
            http: http::client()?,
            oauth,
            consumer,
            api_base: API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn token_url(&self) -> String {
        format!("{}/2/oauth2/token", self.api_base)
    }

    async fn fetch_v2(&self, token: &str) -> PlatformResult<TwitterReport> {
        let me: DataEnvelope<V2User> = read_json(
            PLATFORM,
            self.http
                .get(format!("{}/2/users/me", self.api_base))
                .query(&[("user.fields", "public_metrics,created_at")])
                .bearer_auth(token)
                .send()
                .await?,
        )
        .await?;
        let user = me
            .data
            .ok_or_else(|| PlatformError::malformed(PLATFORM, "users/me returned no data"))?;

        let max_results = RECENT_POST_LIMIT.to_string();
        let timeline: DataEnvelope<Vec<V2Tweet>> = read_json(
            PLATFORM,
            self.http
                .get(format!("{}/2/users/{}/tweets", self.api_base, user.id))
                .query(&[
                    ("max_results", max_results.as_str()),
                    ("tweet.fields", "public_metrics,created_at"),
                ])
                .bearer_auth(token)
                .send()
                .await?,
        )
        .await?;

        // An account without tweets gets no `data` key at all.
        let tweets = timeline
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|t| TweetMetrics {
                likes: t.public_metrics.like_count,
                retweets: t.public_metrics.retweet_count,
            })
            .collect();

        Ok(TwitterReport {
            username: user.username,
            followers_count: user.public_metrics.followers_count,
            following_count: user.public_metrics.following_count,
            tweet_count: user.public_metrics.tweet_count,
            listed_count: user.public_metrics.listed_count,
            tweets,
        })
    }

    /// Signed GET against a v1.1 endpoint.
    async fn signed_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        token: &str,
        token_secret: &str,
    ) -> PlatformResult<T> {
        let url = format!("{}/1.1/{}", self.api_base, path);
        let keys = OAuth1Keys {
            consumer_key: &self.consumer.key,
            consumer_secret: &self.consumer.secret,
            token,
            token_secret,
        };
        let header = oauth1::authorization_header(
            "GET",
            &url,
            params,
            &keys,
            &oauth1::fresh_nonce(),
            Utc::now().timestamp(),
        )?;

        read_json(
            PLATFORM,
            self.http
                .get(&url)
                .query(params)
                .header(reqwest::header::AUTHORIZATION, header)
                .send()
                .await?,
        )
        .await
    }

    async fn fetch_v1(&self, token: &str, token_secret: &str) -> PlatformResult<TwitterReport> {
        let user: V1User = self
            .signed_get(
                "account/verify_credentials.json",
                &[("skip_status", "true")],
                token,
                token_secret,
            )
            .await?;

        let count = RECENT_POST_LIMIT.to_string();
        let timeline: Vec<V1Tweet> = self
            .signed_get(
                "statuses/user_timeline.json",
                &[("count", count.as_str()), ("trim_user", "true")],
                token,
                token_secret,
            )
            .await?;

        Ok(TwitterReport {
            username: user.screen_name,
            followers_count: user.followers_count,
            following_count: user.friends_count,
            tweet_count: user.statuses_count,
            listed_count: user.listed_count,
            tweets: timeline
                .into_iter()
                .map(|t| TweetMetrics {
                    likes: t.favorite_count,
                    retweets: t.retweet_count,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl TwitterApi for TwitterClient {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> PlatformResult<TokenGrant> {
        request_token(
            &self.http,
            PLATFORM,
            &self.token_url(),
            &[
                ("grant_type", "authorization_code"),
                ("client_id", self.oauth.client_id.as_str()),
                ("redirect_uri", self.oauth.redirect_uri.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
            ],
            Some((self.oauth.client_id.as_str(), self.oauth.client_secret.as_str())),
        )
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        request_token(
            &self.http,
            PLATFORM,
            &self.token_url(),
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.oauth.client_id.as_str()),
            ],
            Some((self.oauth.client_id.as_str(), self.oauth.client_secret.as_str())),
        )
        .await
    }

    #[instrument(skip(self, auth))]
    async fn fetch_profile(&self, auth: &TwitterAuth) -> PlatformResult<TwitterReport> {
        let report = match auth {
            TwitterAuth::Bearer(token) => self.fetch_v2(token).await?,
            TwitterAuth::OAuth1 { token, token_secret } => self.fetch_v1(token, token_secret).await?,
        };
        debug!(username = %report.username, tweets = report.tweets.len(), "fetched Twitter profile");
        Ok(report)
    }
}

// -- Wire types --

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct V2User {
    id: String,
    username: String,
    #[serde(default)]
    public_metrics: V2UserMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct V2UserMetrics {
    #[serde(default)]
    followers_count: i64,
    #[serde(default)]
    following_count: i64,
    #[serde(default)]
    tweet_count: i64,
    #[serde(default)]
    listed_count: i64,
}

#[derive(Debug, Deserialize)]
struct V2Tweet {
    #[serde(default)]
    public_metrics: V2TweetMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct V2TweetMetrics {
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    retweet_count: i64,
}

#[derive(Debug, Deserialize)]
struct V1User {
    screen_name: String,
    #[serde(default)]
    followers_count: i64,
    #[serde(default)]
    friends_count: i64,
    #[serde(default)]
    statuses_count: i64,
    #[serde(default)]
    listed_count: i64,
}

#[derive(Debug, Deserialize)]
struct V1Tweet {
    #[serde(default)]
    favorite_count: i64,
    #[serde(default)]
    retweet_count: i64,
}
