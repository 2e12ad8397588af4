//! Instagram through its web endpoints. There is no official API for
//! personal accounts, so this logs in like the browser does and reads the
//! public profile payload.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{PlatformError, PlatformResult};
use crate::http::{USER_AGENT, read_json};

const PLATFORM: &str = "instagram";

pub const WEB_BASE: &str = "https://www.instagram.com";
/// Application id the web client sends with API calls.
pub const WEB_APP_ID: &str = "936619743392459";

#[derive(Debug, Clone, Copy, Default)]
pub struct PostMetrics {
    pub likes: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Default)]
pub struct InstagramReport {
    pub username: String,
    pub followers_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    /// Most recent posts, newest first.
    pub posts: Vec<PostMetrics>,
}

#[async_trait]
pub trait InstagramApi: Send + Sync {
    /// Log in as `username` and read that account's profile and recent posts.
    async fn fetch_profile(&self, username: &str, password: &str) -> PlatformResult<InstagramReport>;
}

pub struct InstagramClient {
    base_url: String,
}

impl Default for InstagramClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InstagramClient {
    pub fn new() -> Self {
        Self {
            base_url: WEB_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fresh cookie-carrying client, one per login session.
    fn session(&self) -> PlatformResult<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?)
    }

    async fn login(&self, http: &reqwest::Client, username: &str, password: &str) -> PlatformResult<()> {
        let login_page = format!("{}/accounts/login/", self.base_url);
        let res = http.get(&login_page).send().await?;
        let csrf = res
            .cookies()
            .find(|c| c.name() == "csrftoken")
            .map(|c| c.value().to_string())
            .ok_or_else(|| PlatformError::malformed(PLATFORM, "login page set no csrftoken"))?;

        let enc_password = format!("#PWD_INSTAGRAM_BROWSER:0:{}:{}", Utc::now().timestamp(), password);
        let res = http
            .post(format!("{}/accounts/login/ajax/", self.base_url))
            .header("X-CSRFToken", csrf)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-IG-App-ID", WEB_APP_ID)
            .header(reqwest::header::REFERER, login_page)
            .form(&[
                ("username", username),
                ("enc_password", enc_password.as_str()),
                ("queryParams", "{}"),
                ("optIntoOneTap", "false"),
            ])
            .send()
            .await?;

        let outcome: LoginOutcome = read_json(PLATFORM, res).await?;
        if !outcome.authenticated {
            warn!(user_found = outcome.user, "Instagram login rejected");
            return Err(PlatformError::Auth(
                outcome
                    .message
                    .unwrap_or_else(|| "Instagram rejected the username or password".into()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InstagramApi for InstagramClient {
    #[instrument(skip(self, password))]
    async fn fetch_profile(&self, username: &str, password: &str) -> PlatformResult<InstagramReport> {
        let http = self.session()?;
        self.login(&http, username, password).await?;

        let res = http
            .get(format!("{}/api/v1/users/web_profile_info/", self.base_url))
            .query(&[("username", username)])
            .header("X-IG-App-ID", WEB_APP_ID)
            .send()
            .await?;
        let info: ProfileInfo = read_json(PLATFORM, res).await?;
        let user = info
            .data
            .user
            .ok_or_else(|| PlatformError::NotFound(format!("Instagram user '{}' not found", username)))?;

        let report = InstagramReport {
            username: user.username,
            followers_count: user.edge_followed_by.count,
            following_count: user.edge_follow.count,
            post_count: user.edge_owner_to_timeline_media.count,
            posts: user
                .edge_owner_to_timeline_media
                .edges
                .into_iter()
                .map(|e| PostMetrics {
                    likes: e.node.edge_liked_by.count,
                    comments: e.node.edge_media_to_comment.count,
                })
                .collect(),
        };
        debug!(posts = report.posts.len(), "fetched Instagram profile");
        Ok(report)
    }
}

// -- Wire types --

#[derive(Debug, Deserialize)]
struct LoginOutcome {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    user: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileInfo {
    data: ProfileData,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    user: Option<ProfileUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    username: String,
    #[serde(default)]
    edge_followed_by: Counter,
    #[serde(default)]
    edge_follow: Counter,
    #[serde(default)]
    edge_owner_to_timeline_media: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Counter {
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    #[serde(default)]
    count: i64,
    #[serde(default)]
    edges: Vec<TimelineEdge>,
}

#[derive(Debug, Deserialize)]
struct TimelineEdge {
    node: TimelineNode,
}

#[derive(Debug, Deserialize)]
struct TimelineNode {
    #[serde(default)]
    edge_liked_by: Counter,
    #[serde(default)]
    edge_media_to_comment: Counter,
}
