//! Row types, one per table, mapped by hand in `queries`.
//! Timestamps stay as the stored RFC 3339 text; see `crate::parse_timestamp`.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Default, Clone)]
pub struct SocialAccountRow {
    pub user_id: String,
    pub youtube: bool,
    pub twitter: bool,
    pub instagram: bool,
    pub youtube_channel_id: Option<String>,
    pub twitter_username: Option<String>,
    pub instagram_username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub user_id: String,
    pub platform: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_secret: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<String>,
    pub scopes: Option<String>,
    pub account_handle: Option<String>,
    pub password: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Values written by a credential upsert. A `None` account handle keeps the
/// stored one. A `None` refresh token keeps the stored one only when both the
/// old and new credentials are OAuth2 grants. Every other column is
/// overwritten.
#[derive(Debug, Default, Clone)]
pub struct NewCredential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_secret: Option<String>,
    pub token_type: Option<String>,
    pub expires_at: Option<String>,
    pub scopes: Option<String>,
    pub account_handle: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PendingOAuthRow {
    pub state: String,
    pub user_id: String,
    pub platform: String,
    pub code_verifier: Option<String>,
    pub expires_at: String,
}

#[derive(Debug, Clone)]
pub struct YouTubeStatsRow {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub subscriber_count: i64,
    pub view_count: i64,
    pub video_count: i64,
    pub videos_checked: i64,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewYouTubeStats {
    pub title: String,
    pub subscriber_count: i64,
    pub view_count: i64,
    pub video_count: i64,
    pub videos_checked: i64,
    pub avg_views: f64,
    pub avg_likes: f64,
    pub avg_comments: f64,
}

#[derive(Debug, Clone)]
pub struct TwitterStatsRow {
    pub id: i64,
    pub user_id: String,
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
    pub recorded_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewTwitterStats {
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
}

#[derive(Debug, Clone)]
pub struct InstagramStatsRow {
    pub id: i64,
    pub user_id: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub total_posts_checked: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewInstagramStats {
    pub followers_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub total_posts_checked: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub avg_likes: f64,
    pub avg_comments: f64,
}
