use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TokenKind;

// -- JWT Claims --

/// Session token claims. Both halves of a token pair carry the same shape;
/// `kind` keeps a refresh token from being accepted as an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub kind: TokenKind,
    pub exp: usize,
}

/// Claims of the signed `state` parameter handed to Google during the
/// YouTube authorization flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStateClaims {
    pub sub: Uuid,
    pub platform: String,
    pub jti: String,
    pub exp: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub name: String,
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenRefreshResponse {
    pub access: String,
}

// -- Account --

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountStatusResponse {
    pub youtube: bool,
    pub twitter: bool,
    pub instagram: bool,
}

// -- OAuth --

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizationUrlResponse {
    pub authorization_url: String,
}

/// Query string the vendor appends when redirecting back to us.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

// -- Manual connects --

#[derive(Debug, Deserialize)]
pub struct YouTubeConnectRequest {
    #[serde(default)]
    pub channel_id: String,
}

/// Legacy Twitter link using an OAuth1 user token pair.
#[derive(Debug, Deserialize)]
pub struct TwitterConnectRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct InstagramConnectRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Answer to a successful connect: the link is stored and a first snapshot
/// was taken.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse<S> {
    pub message: String,
    pub snapshot: S,
}

// -- Status / stats --

#[derive(Debug, Serialize, Deserialize)]
pub struct PlatformStatusResponse<S> {
    pub connected: bool,
    pub handle: Option<String>,
    pub latest: Option<S>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeSnapshot {
    pub title: String,
    pub subscriber_count: i64,
    pub view_count: i64,
    pub video_count: i64,
    pub videos_checked: i64,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    pub recorded_at: DateTime<Utc>,
}

/// One of the channel's most recent uploads, as read during a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentVideo {
    pub title: String,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

/// A fresh YouTube snapshot plus the uploads it was averaged over. Only the
/// snapshot is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeRefreshResponse {
    #[serde(flatten)]
    pub snapshot: YouTubeSnapshot,
    pub videos: Vec<RecentVideo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterSnapshot {
    pub username: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub tweet_count: i64,
    pub listed_count: i64,
    pub tweets_checked: i64,
    pub likes_count: i64,
    pub retweets_count: i64,
    pub avg_likes: f64,
    pub avg_retweets: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramSnapshot {
    pub followers_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub total_posts_checked: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    /// Named `timestamp` because the dashboard charts key on it.
    #[serde(rename = "timestamp")]
    pub recorded_at: DateTime<Utc>,
}
