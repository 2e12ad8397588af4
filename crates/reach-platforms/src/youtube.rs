//! Google OAuth2 and the YouTube Data API v3.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{PlatformError, PlatformResult};
use crate::http::{self, read_json};
use crate::metrics::RECENT_POST_LIMIT;
use crate::oauth2::{TokenGrant, request_token};

const PLATFORM: &str = "youtube";

pub const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Build the Google consent URL. `access_type=offline` together with
/// `prompt=consent` is what makes Google issue a refresh token.
pub fn authorization_url(config: &GoogleOAuthConfig, state: &str) -> PlatformResult<String> {
    let scope = config.scopes.join(" ");
    let url = reqwest::Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("include_granted_scopes", "true"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| PlatformError::malformed(PLATFORM, e))?;
    Ok(url.into())
}

/// How a channel lookup authenticates.
#[derive(Debug, Clone)]
pub enum YouTubeAuth {
    /// Public data for a known channel id, using the server's API key.
    ApiKey { key: String, channel_id: String },
    /// The authorizing user's own channel.
    Bearer(String),
}

#[derive(Debug, Clone, Default)]
pub struct VideoStats {
    pub title: String,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ChannelReport {
    pub channel_id: String,
    pub title: String,
    pub subscriber_count: i64,
    pub view_count: i64,
    pub video_count: i64,
    /// Most recent uploads, newest first, at most `RECENT_POST_LIMIT`.
    pub videos: Vec<VideoStats>,
}

#[async_trait]
pub trait YouTubeApi: Send + Sync {
    async fn exchange_code(&self, code: &str) -> PlatformResult<TokenGrant>;

    async fn refresh_access_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant>;

    async fn fetch_channel(&self, auth: &YouTubeAuth) -> PlatformResult<ChannelReport>;
}

pub struct YouTubeClient {
    http: reqwest::Client,
    oauth: GoogleOAuthConfig,
    api_base: String,
    token_url: String,
}

impl YouTubeClient {
    pub fn new(oauth: GoogleOAuthConfig) -> PlatformResult<Self> {
        Ok(Self {
            http: http::client()?,
            oauth,
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
        })
    }

    /// Point the client at a different API host (staging, a local fake).
    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.token_url = token_url.into();
        self
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        auth: &YouTubeAuth,
        params: &[(&str, &str)],
    ) -> PlatformResult<T> {
        let mut req = self.http.get(format!("{}/{}", self.api_base, path)).query(params);
        req = match auth {
            YouTubeAuth::ApiKey { key, .. } => req.query(&[("key", key.as_str())]),
            YouTubeAuth::Bearer(token) => req.bearer_auth(token),
        };
        read_json(PLATFORM, req.send().await?).await
    }

    async fn recent_videos(&self, auth: &YouTubeAuth, uploads: &str) -> PlatformResult<Vec<VideoStats>> {
        let max_results = RECENT_POST_LIMIT.to_string();
        let playlist: ListResponse<PlaylistItem> = self
            .get(
                "playlistItems",
                auth,
                &[
                    ("part", "contentDetails"),
                    ("playlistId", uploads),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;

        let ids: Vec<String> = playlist
            .items
            .into_iter()
            .map(|item| item.content_details.video_id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let videos: ListResponse<Video> = self
            .get("videos", auth, &[("part", "snippet,statistics"), ("id", joined.as_str())])
            .await?;

        Ok(videos
            .items
            .into_iter()
            .map(|v| VideoStats {
                title: v.snippet.title,
                views: count(&v.statistics.view_count),
                likes: count(&v.statistics.like_count),
                comments: count(&v.statistics.comment_count),
            })
            .collect())
    }
}

#[async_trait]
impl YouTubeApi for YouTubeClient {
    async fn exchange_code(&self, code: &str) -> PlatformResult<TokenGrant> {
        request_token(
            &self.http,
            PLATFORM,
            &self.token_url,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.oauth.redirect_uri.as_str()),
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
            ],
            None,
        )
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        request_token(
            &self.http,
            PLATFORM,
            &self.token_url,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
            ],
            None,
        )
        .await
    }

    #[instrument(skip(self, auth))]
    async fn fetch_channel(&self, auth: &YouTubeAuth) -> PlatformResult<ChannelReport> {
        const PARTS: &str = "snippet,statistics,contentDetails";
        let channels: ListResponse<Channel> = match auth {
            YouTubeAuth::ApiKey { channel_id, .. } => {
                self.get("channels", auth, &[("part", PARTS), ("id", channel_id.as_str())])
                    .await?
            }
            YouTubeAuth::Bearer(_) => {
                self.get("channels", auth, &[("part", PARTS), ("mine", "true")]).await?
            }
        };

        let channel = channels
            .items
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::NotFound("YouTube channel not found".into()))?;

        let videos = match channel
            .content_details
            .as_ref()
            .and_then(|d| d.related_playlists.uploads.as_deref())
        {
            Some(uploads) => self.recent_videos(auth, uploads).await?,
            None => Vec::new(),
        };

        debug!(channel = %channel.id, videos = videos.len(), "fetched YouTube channel");

        Ok(ChannelReport {
            channel_id: channel.id,
            title: channel.snippet.title,
            subscriber_count: count(&channel.statistics.subscriber_count),
            view_count: count(&channel.statistics.view_count),
            video_count: count(&channel.statistics.video_count),
            videos,
        })
    }
}

/// The Data API reports counters as decimal strings, and omits hidden ones.
fn count(raw: &Option<String>) -> i64 {
    raw.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0)
}

// -- Wire types --

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Channel {
    id: String,
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
    content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    subscriber_count: Option<String>,
    view_count: Option<String>,
    video_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct Video {
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
}
