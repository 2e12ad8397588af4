//! End-to-end tests of the HTTP surface against an in-memory database and
//! scripted vendor clients.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use reach_api::auth::{AppState, AppStateInner, issue_session};
use reach_api::config::Config;
use reach_db::models::PendingOAuthRow;
use reach_db::{Database, format_timestamp};
use reach_platforms::instagram::{InstagramApi, InstagramReport, PostMetrics};
use reach_platforms::oauth2::TokenGrant;
use reach_platforms::pkce::challenge_for;
use reach_platforms::twitter::{TweetMetrics, TwitterApi, TwitterAuth, TwitterReport};
use reach_platforms::youtube::{ChannelReport, VideoStats, YouTubeApi, YouTubeAuth};
use reach_platforms::{PlatformError, PlatformResult, Platforms};
use reach_types::Platform;

// -- Scripted vendors --

fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in: Some(3600),
        scope: Some("read".into()),
        token_type: Some("bearer".into()),
    }
}

fn rejected(platform: &'static str) -> PlatformError {
    PlatformError::Status {
        platform,
        status: 400,
        body: "{\"error\":\"invalid_grant\"}".into(),
    }
}

#[derive(Default)]
struct FakeYouTube {
    /// Subscriber counts handed out by successive channel fetches.
    subscribers: Mutex<VecDeque<i64>>,
    fetches: Mutex<Vec<YouTubeAuth>>,
    refreshes: Mutex<Vec<String>>,
    /// Google revoked the refresh token.
    refresh_revoked: Mutex<bool>,
}

#[async_trait]
impl YouTubeApi for FakeYouTube {
    async fn exchange_code(&self, code: &str) -> PlatformResult<TokenGrant> {
        match code {
            "good-code" => Ok(grant("yt-access", Some("yt-refresh"))),
            _ => Err(rejected("youtube")),
        }
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        self.refreshes.lock().unwrap().push(refresh_token.to_string());
        if *self.refresh_revoked.lock().unwrap() {
            return Err(rejected("youtube"));
        }
        Ok(grant("yt-refreshed", None))
    }

    async fn fetch_channel(&self, auth: &YouTubeAuth) -> PlatformResult<ChannelReport> {
        self.fetches.lock().unwrap().push(auth.clone());
        let channel_id = match auth {
            YouTubeAuth::ApiKey { channel_id, .. } if channel_id == "UC-missing" => {
                return Err(PlatformError::NotFound("YouTube channel not found".into()));
            }
            YouTubeAuth::ApiKey { channel_id, .. } => channel_id.clone(),
            YouTubeAuth::Bearer(_) => "UC-mine".to_string(),
        };
        let subscriber_count = self.subscribers.lock().unwrap().pop_front().unwrap_or(0);

        Ok(ChannelReport {
            channel_id,
            title: "Cooking Daily".into(),
            subscriber_count,
            view_count: 5000,
            video_count: 2,
            videos: vec![
                VideoStats { title: "Ramen".into(), views: 300, likes: 30, comments: 3 },
                VideoStats { title: "Dumplings".into(), views: 100, likes: 10, comments: 1 },
            ],
        })
    }
}

#[derive(Default)]
struct FakeTwitter {
    verifiers: Mutex<Vec<String>>,
    fetches: Mutex<Vec<TwitterAuth>>,
    refreshes: Mutex<Vec<String>>,
}

#[async_trait]
impl TwitterApi for FakeTwitter {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> PlatformResult<TokenGrant> {
        self.verifiers.lock().unwrap().push(code_verifier.to_string());
        match code {
            "good-code" => Ok(grant("tw-access", Some("tw-refresh"))),
            _ => Err(rejected("twitter")),
        }
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> PlatformResult<TokenGrant> {
        self.refreshes.lock().unwrap().push(refresh_token.to_string());
        Ok(grant("tw-refreshed", Some("tw-refresh-2")))
    }

    async fn fetch_profile(&self, auth: &TwitterAuth) -> PlatformResult<TwitterReport> {
        self.fetches.lock().unwrap().push(auth.clone());
        Ok(TwitterReport {
            username: "alice_tw".into(),
            followers_count: 900,
            following_count: 80,
            tweet_count: 1200,
            listed_count: 7,
            tweets: vec![
                TweetMetrics { likes: 10, retweets: 2 },
                TweetMetrics { likes: 20, retweets: 4 },
            ],
        })
    }
}

struct FakeInstagram;

#[async_trait]
impl InstagramApi for FakeInstagram {
    async fn fetch_profile(&self, username: &str, password: &str) -> PlatformResult<InstagramReport> {
        if password == "wrong" {
            return Err(PlatformError::Auth("The password you entered is incorrect".into()));
        }
        let posts = if username == "quiet" {
            Vec::new()
        } else {
            vec![
                PostMetrics { likes: 40, comments: 4 },
                PostMetrics { likes: 20, comments: 0 },
            ]
        };
        Ok(InstagramReport {
            username: username.to_string(),
            followers_count: 300,
            following_count: 12,
            post_count: posts.len() as i64,
            posts,
        })
    }
}

// -- Harness --

struct Harness {
    app: Router,
    state: AppState,
    youtube: Arc<FakeYouTube>,
    twitter: Arc<FakeTwitter>,
}

fn harness_with(config: Config) -> Harness {
    let youtube = Arc::new(FakeYouTube::default());
    let twitter = Arc::new(FakeTwitter::default());
    let platforms = Platforms {
        youtube: youtube.clone(),
        twitter: twitter.clone(),
        instagram: Arc::new(FakeInstagram),
    };
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        config,
        platforms,
    });
    Harness {
        app: reach_api::router(state.clone()),
        state,
        youtube,
        twitter,
    }
}

fn harness() -> Harness {
    harness_with(Config::with_secret("test-secret"))
}

impl Harness {
    /// A stored user and a valid access token for them.
    fn user(&self, name: &str) -> (String, String) {
        let id = Uuid::new_v4();
        assert!(self
            .state
            .db
            .create_user(&id.to_string(), name, None, "not-a-real-hash")
            .unwrap());
        let (access, _) = issue_session(&self.state.config, id, name).unwrap();
        (id.to_string(), access)
    }

    async fn call(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.call(req).await;
        let status = res.status();
        (status, json_body(res).await)
    }
}

async fn json_body(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn send_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    send_json("POST", uri, token, body)
}

fn query_param(url: &str, name: &str) -> String {
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
    let raw = query
        .split('&')
        .find_map(|pair| pair.strip_prefix(&format!("{name}=")))
        .unwrap_or_else(|| panic!("no {name} in {url}"));
    urlencoding::decode(raw).unwrap().into_owned()
}

fn location(res: &Response) -> String {
    res.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// -- Sessions --

#[tokio::test]
async fn signup_login_and_token_refresh() {
    let h = harness();

    let (status, body) = h
        .send(post(
            "/api/signup/",
            None,
            json!({"username": "alice", "email": "a@example.com", "password": "correct horse"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["user_id"].is_string());

    let (status, body) = h
        .send(post("/api/signup/", None, json!({"username": "alice", "password": "another one"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username already taken");

    let (status, _) = h
        .send(post("/api/login/", None, json!({"username": "alice", "password": "wrong pass"})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = h
        .send(post("/api/login/", None, json!({"username": "alice", "password": "correct horse"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["name"], "alice");
    let access = login["access"].as_str().unwrap();
    let refresh = login["refresh"].as_str().unwrap();

    // An access token is not a refresh token, and vice versa.
    let (status, _) = h
        .send(post("/api/token/refresh/", None, json!({"refresh": access})))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = h.send(get("/api/account_status/", Some(refresh))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h
        .send(post("/api/token/refresh/", None, json!({"refresh": refresh})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let renewed = body["access"].as_str().unwrap();
    let (status, _) = h.send(get("/api/account_status/", Some(renewed))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn signup_validates_input() {
    let h = harness();

    let (status, _) = h
        .send(post("/api/signup/", None, json!({"username": "al", "password": "long enough"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .send(post("/api/signup/", None, json!({"username": "alice", "password": "short"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.send(post("/api/signup/", None, json!({"username": "alice"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("password"));
}

#[tokio::test]
async fn username_length_counts_characters() {
    let h = harness();

    // 20 characters, 40 bytes.
    let (status, _) = h
        .send(post("/api/signup/", None, json!({"username": "é".repeat(20), "password": "long enough"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = h
        .send(post("/api/signup/", None, json!({"username": "éé", "password": "long enough"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_need_an_access_token() {
    let h = harness();

    let (status, body) = h.send(get("/api/account_status/", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = h.send(get("/youtube/status/", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = h.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "ok");
}

// -- Account status --

#[tokio::test]
async fn account_status_defaults_to_nothing_linked() {
    let h = harness();
    let (_, token) = h.user("alice");

    let (status, body) = h.send(get("/api/account_status/", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"youtube": false, "twitter": false, "instagram": false}));

    let (status, _) = h
        .send(post("/instagram/connect/", Some(&token), json!({"username": "chef", "password": "pw"})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = h.send(get("/api/account_status/", Some(&token))).await;
    assert_eq!(body, json!({"youtube": false, "twitter": false, "instagram": true}));
}

// -- Not connected --

#[tokio::test]
async fn disconnect_when_not_connected_is_a_404() {
    let h = harness();
    let (_, token) = h.user("alice");

    let (status, body) = h
        .send(send_json("DELETE", "/instagram/disconnect/", Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Instagram not connected");

    let (status, _) = h.send(post("/twitter/disconnect/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refresh_without_credential_takes_no_snapshot() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    for platform in Platform::ALL {
        let (status, body) = h
            .send(post(&format!("/{}/refresh/", platform.as_str()), Some(&token), json!({})))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], format!("{} not connected", platform.display_name()));
        assert_eq!(h.state.db.count_stats(&user_id, platform).unwrap(), 0);
    }
    assert!(h.youtube.fetches.lock().unwrap().is_empty());
}

// -- YouTube --

#[tokio::test]
async fn youtube_connect_then_refresh_records_ordered_snapshots() {
    let h = harness();
    let (user_id, token) = h.user("alice");
    h.youtube.subscribers.lock().unwrap().extend([100, 150, 200]);

    let (status, body) = h
        .send(post("/youtube/connect/", Some(&token), json!({"channel_id": "UC123"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["snapshot"]["subscriber_count"], 100);
    assert_eq!(body["snapshot"]["videos_checked"], 2);
    assert_eq!(body["snapshot"]["avg_views"], 200.0);

    for expected in [150, 200] {
        let (status, body) = h.send(post("/youtube/refresh/", Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subscriber_count"], expected);
        assert_eq!(body["avg_likes"], 20.0);
        assert_eq!(
            body["videos"],
            json!([
                {"title": "Ramen", "views": 300, "likes": 30, "comments": 3},
                {"title": "Dumplings", "views": 100, "likes": 10, "comments": 1},
            ])
        );
    }

    // Refreshes of a channel linked by id go through the API key.
    let fetches = h.youtube.fetches.lock().unwrap().clone();
    assert_eq!(fetches.len(), 3);
    assert!(fetches.iter().all(
        |auth| matches!(auth, YouTubeAuth::ApiKey { channel_id, .. } if channel_id == "UC123")
    ));

    let (status, body) = h.send(get("/youtube/stats/", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let snapshots = body.as_array().unwrap();
    let counts: Vec<i64> = snapshots.iter().map(|s| s["subscriber_count"].as_i64().unwrap()).collect();
    assert_eq!(counts, vec![100, 150, 200]);
    let times: Vec<&str> = snapshots.iter().map(|s| s["recorded_at"].as_str().unwrap()).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));

    let (_, body) = h.send(get("/youtube/status/", Some(&token))).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["handle"], "UC123");
    assert_eq!(body["latest"]["subscriber_count"], 200);

    assert_eq!(h.state.db.count_stats(&user_id, Platform::YouTube).unwrap(), 3);
}

#[tokio::test]
async fn reconnecting_keeps_a_single_credential() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    for channel in ["UC1", "UC2"] {
        let (status, _) = h
            .send(post("/youtube/connect/", Some(&token), json!({"channel_id": channel})))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    assert_eq!(h.state.db.count_credentials(&user_id, Platform::YouTube).unwrap(), 1);
    let credential = h.state.db.get_credential(&user_id, Platform::YouTube).unwrap().unwrap();
    assert_eq!(credential.account_handle.as_deref(), Some("UC2"));
}

#[tokio::test]
async fn youtube_connect_validates_the_channel() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (status, body) = h.send(post("/youtube/connect/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "channel_id is required");

    let (status, _) = h
        .send(post("/youtube/connect/", Some(&token), json!({"channel_id": "UC-missing"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.state.db.get_credential(&user_id, Platform::YouTube).unwrap().is_none());
}

#[tokio::test]
async fn youtube_oauth_flow_links_and_refreshes_expired_tokens() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (status, body) = h.send(get("/youtube/initiate/", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["authorization_url"].as_str().unwrap();
    assert_eq!(query_param(url, "access_type"), "offline");
    let state = query_param(url, "state");

    let res = h
        .call(get(&format!("/youtube/callback/?code=good-code&state={state}"), None))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&res), "http://localhost:5173/dashboard");

    let credential = h.state.db.get_credential(&user_id, Platform::YouTube).unwrap().unwrap();
    assert_eq!(credential.access_token.as_deref(), Some("yt-access"));
    assert_eq!(credential.refresh_token.as_deref(), Some("yt-refresh"));

    // Age the token past its expiry.
    let past = format_timestamp(Utc::now() - Duration::hours(1));
    h.state
        .db
        .update_credential_tokens(&user_id, Platform::YouTube, "yt-stale", None, Some(&past))
        .unwrap();

    let (status, _) = h.send(post("/youtube/refresh/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(*h.youtube.refreshes.lock().unwrap(), vec!["yt-refresh".to_string()]);
    let fetches = h.youtube.fetches.lock().unwrap().clone();
    assert!(matches!(fetches.last(), Some(YouTubeAuth::Bearer(t)) if t == "yt-refreshed"));

    let credential = h.state.db.get_credential(&user_id, Platform::YouTube).unwrap().unwrap();
    assert_eq!(credential.access_token.as_deref(), Some("yt-refreshed"));
    // The vendor issued no new refresh token; the old one is kept.
    assert_eq!(credential.refresh_token.as_deref(), Some("yt-refresh"));
    assert!(credential.expires_at.unwrap() > format_timestamp(Utc::now()));
}

#[tokio::test]
async fn youtube_oauth_relink_replaces_channel_linked_by_id() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (status, _) = h
        .send(post("/youtube/connect/", Some(&token), json!({"channel_id": "UC123"})))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = h.send(get("/youtube/initiate/", Some(&token))).await;
    let state = query_param(body["authorization_url"].as_str().unwrap(), "state");
    let res = h
        .call(get(&format!("/youtube/callback/?code=good-code&state={state}"), None))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    // The token belongs to the authorizing user's own channel.
    let fetches = h.youtube.fetches.lock().unwrap().clone();
    assert!(matches!(fetches.last(), Some(YouTubeAuth::Bearer(t)) if t == "yt-access"));

    let (_, body) = h.send(get("/youtube/status/", Some(&token))).await;
    assert_eq!(body["handle"], "UC-mine");
    let credential = h.state.db.get_credential(&user_id, Platform::YouTube).unwrap().unwrap();
    assert_eq!(credential.account_handle.as_deref(), Some("UC-mine"));
    assert_eq!(credential.access_token.as_deref(), Some("yt-access"));
}

#[tokio::test]
async fn rejected_refresh_grant_takes_no_snapshot() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (_, body) = h.send(get("/youtube/initiate/", Some(&token))).await;
    let state = query_param(body["authorization_url"].as_str().unwrap(), "state");
    h.call(get(&format!("/youtube/callback/?code=good-code&state={state}"), None))
        .await;

    let past = format_timestamp(Utc::now() - Duration::hours(1));
    h.state
        .db
        .update_credential_tokens(&user_id, Platform::YouTube, "yt-stale", None, Some(&past))
        .unwrap();
    *h.youtube.refresh_revoked.lock().unwrap() = true;
    let fetches_before = h.youtube.fetches.lock().unwrap().len();

    let (status, body) = h.send(post("/youtube/refresh/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid_grant"));

    assert_eq!(*h.youtube.refreshes.lock().unwrap(), vec!["yt-refresh".to_string()]);
    assert_eq!(h.youtube.fetches.lock().unwrap().len(), fetches_before);
    assert_eq!(h.state.db.count_stats(&user_id, Platform::YouTube).unwrap(), 0);
    let credential = h.state.db.get_credential(&user_id, Platform::YouTube).unwrap().unwrap();
    assert_eq!(credential.access_token.as_deref(), Some("yt-stale"));
    assert_eq!(credential.refresh_token.as_deref(), Some("yt-refresh"));
}

#[tokio::test]
async fn youtube_callback_rejects_forged_and_replayed_state() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (status, _) = h
        .send(get("/youtube/callback/?code=good-code&state=not-a-jwt", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = h.send(get("/youtube/initiate/", Some(&token))).await;
    let state = query_param(body["authorization_url"].as_str().unwrap(), "state");
    let callback = format!("/youtube/callback/?code=good-code&state={state}");

    let res = h.call(get(&callback, None)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    h.state.db.disconnect(&user_id, Platform::YouTube, false).unwrap();

    // The same state cannot be used twice.
    let (status, _) = h.send(get(&callback, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.state.db.get_credential(&user_id, Platform::YouTube).unwrap().is_none());
}

// -- Twitter --

#[tokio::test]
async fn twitter_pkce_flow_stores_the_credential() {
    let h = harness_with(Config {
        issue_session_on_callback: true,
        ..Config::with_secret("test-secret")
    });
    let (user_id, token) = h.user("alice");

    let (status, body) = h.send(get("/twitter/initiate/", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["authorization_url"].as_str().unwrap();
    assert_eq!(query_param(url, "code_challenge_method"), "S256");
    let challenge = query_param(url, "code_challenge");
    let state = query_param(url, "state");

    let res = h
        .call(get(&format!("/twitter/callback/?code=good-code&state={state}"), None))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let target = location(&res);
    assert!(target.starts_with("http://localhost:5173/dashboard?access="));
    assert!(target.contains("&refresh="));

    // The verifier sent to the token endpoint is the one behind the challenge.
    let verifiers = h.twitter.verifiers.lock().unwrap().clone();
    assert_eq!(verifiers.len(), 1);
    assert_eq!(challenge_for(&verifiers[0]), challenge);

    let credential = h.state.db.get_credential(&user_id, Platform::Twitter).unwrap().unwrap();
    assert_eq!(credential.access_token.as_deref(), Some("tw-access"));
    assert_eq!(credential.refresh_token.as_deref(), Some("tw-refresh"));
    assert_eq!(credential.account_handle.as_deref(), Some("alice_tw"));

    let (_, body) = h.send(get("/api/account_status/", Some(&token))).await;
    assert_eq!(body["twitter"], true);

    // OAuth2 credentials fetch through the bearer path.
    let (status, body) = h.send(post("/twitter/refresh/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["avg_likes"], 15.0);
    assert_eq!(body["avg_retweets"], 3.0);
    let fetches = h.twitter.fetches.lock().unwrap().clone();
    assert!(matches!(fetches.last(), Some(TwitterAuth::Bearer(t)) if t == "tw-access"));
}

#[tokio::test]
async fn twitter_expired_token_is_refreshed_before_fetching() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (_, body) = h.send(get("/twitter/initiate/", Some(&token))).await;
    let state = query_param(body["authorization_url"].as_str().unwrap(), "state");
    let res = h
        .call(get(&format!("/twitter/callback/?code=good-code&state={state}"), None))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let past = format_timestamp(Utc::now() - Duration::minutes(5));
    h.state
        .db
        .update_credential_tokens(&user_id, Platform::Twitter, "tw-stale", None, Some(&past))
        .unwrap();

    let (status, body) = h.send(post("/twitter/refresh/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice_tw");

    assert_eq!(*h.twitter.refreshes.lock().unwrap(), vec!["tw-refresh".to_string()]);
    let fetches = h.twitter.fetches.lock().unwrap().clone();
    assert!(matches!(fetches.last(), Some(TwitterAuth::Bearer(t)) if t == "tw-refreshed"));

    // Twitter rotates refresh tokens; the new one replaces the old.
    let credential = h.state.db.get_credential(&user_id, Platform::Twitter).unwrap().unwrap();
    assert_eq!(credential.access_token.as_deref(), Some("tw-refreshed"));
    assert_eq!(credential.refresh_token.as_deref(), Some("tw-refresh-2"));
    assert!(credential.expires_at.unwrap() > format_timestamp(Utc::now()));
}

#[tokio::test]
async fn expired_handshake_is_rejected() {
    let h = harness_with(Config {
        oauth_state_ttl: Duration::seconds(-5),
        ..Config::with_secret("test-secret")
    });
    let (user_id, token) = h.user("alice");

    let (status, body) = h.send(get("/twitter/initiate/", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    let state = query_param(body["authorization_url"].as_str().unwrap(), "state");

    let (status, body) = h
        .send(get(&format!("/twitter/callback/?code=good-code&state={state}"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired state");

    // The code was never exchanged.
    assert!(h.twitter.verifiers.lock().unwrap().is_empty());
    assert!(h.state.db.get_credential(&user_id, Platform::Twitter).unwrap().is_none());
}

#[tokio::test]
async fn handshake_platform_is_parsed_from_storage() {
    let h = harness();
    let (user_id, _) = h.user("alice");
    let expires_at = format_timestamp(Utc::now() + Duration::minutes(5));
    let pending = |key: &str, platform: &str| PendingOAuthRow {
        state: key.to_string(),
        user_id: user_id.clone(),
        platform: platform.to_string(),
        code_verifier: Some("verifier-1".into()),
        expires_at: expires_at.clone(),
    };

    h.state.db.insert_pending_oauth(&pending("state-facebook", "facebook")).unwrap();
    let (status, _) = h
        .send(get("/twitter/callback/?code=good-code&state=state-facebook", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.state.db.get_credential(&user_id, Platform::Twitter).unwrap().is_none());

    // Handshakes recorded under the rebranded name still complete.
    h.state.db.insert_pending_oauth(&pending("state-x", "x")).unwrap();
    let res = h
        .call(get("/twitter/callback/?code=good-code&state=state-x", None))
        .await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(*h.twitter.verifiers.lock().unwrap(), vec!["verifier-1".to_string()]);
    assert!(h.state.db.get_credential(&user_id, Platform::Twitter).unwrap().is_some());
}

#[tokio::test]
async fn twitter_callback_fails_closed() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (status, _) = h
        .send(get("/twitter/callback/?code=good-code&state=bogus", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.send(get("/twitter/callback/?state=bogus", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .send(get("/twitter/callback/?error=access_denied&state=bogus", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The vendor refuses the code: its status comes back, nothing is stored,
    // and the state is spent.
    let (_, body) = h.send(get("/twitter/initiate/", Some(&token))).await;
    let state = query_param(body["authorization_url"].as_str().unwrap(), "state");
    let (status, body) = h
        .send(get(&format!("/twitter/callback/?code=bad-code&state={state}"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid_grant"));

    let (status, _) = h
        .send(get(&format!("/twitter/callback/?code=good-code&state={state}"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(h.state.db.get_credential(&user_id, Platform::Twitter).unwrap().is_none());
}

#[tokio::test]
async fn youtube_state_is_not_accepted_by_twitter() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (_, body) = h.send(get("/youtube/initiate/", Some(&token))).await;
    let state = query_param(body["authorization_url"].as_str().unwrap(), "state");

    let (status, _) = h
        .send(get(&format!("/twitter/callback/?code=good-code&state={state}"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.state.db.get_credential(&user_id, Platform::Twitter).unwrap().is_none());
}

#[tokio::test]
async fn twitter_legacy_connect_signs_with_oauth1() {
    let h = harness();
    let (_, token) = h.user("alice");

    let (status, body) = h
        .send(post("/twitter/connect/", Some(&token), json!({"access_token": "tok"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "access_token_secret is required");

    let (status, body) = h
        .send(post(
            "/twitter/connect/",
            Some(&token),
            json!({"access_token": "tok", "access_token_secret": "sec"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["snapshot"]["username"], "alice_tw");
    assert_eq!(body["snapshot"]["likes_count"], 30);

    let (status, _) = h.send(post("/twitter/refresh/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let fetches = h.twitter.fetches.lock().unwrap().clone();
    assert_eq!(fetches.len(), 2);
    assert!(fetches.iter().all(|auth| matches!(
        auth,
        TwitterAuth::OAuth1 { token, token_secret } if token == "tok" && token_secret == "sec"
    )));

    let (_, body) = h.send(get("/twitter/status/", Some(&token))).await;
    assert_eq!(body["handle"], "alice_tw");
}

// -- Instagram --

#[tokio::test]
async fn instagram_without_posts_averages_zero() {
    let h = harness();
    let (_, token) = h.user("alice");

    let (status, body) = h
        .send(post("/instagram/connect/", Some(&token), json!({"username": "quiet", "password": "pw"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let snapshot = &body["snapshot"];
    assert_eq!(snapshot["total_posts_checked"], 0);
    assert_eq!(snapshot["avg_likes"], 0.0);
    assert_eq!(snapshot["avg_comments"], 0.0);
    assert!(snapshot["timestamp"].is_string());
}

#[tokio::test]
async fn instagram_login_failure_links_nothing() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    let (status, body) = h
        .send(post("/instagram/connect/", Some(&token), json!({"username": "chef"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "password is required");

    let (status, _) = h
        .send(post("/instagram/connect/", Some(&token), json!({"username": "chef", "password": "wrong"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.state.db.get_credential(&user_id, Platform::Instagram).unwrap().is_none());
}

#[tokio::test]
async fn instagram_refresh_reuses_the_stored_login() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    h.send(post("/instagram/connect/", Some(&token), json!({"username": "chef", "password": "pw"})))
        .await;
    let (status, body) = h.send(post("/instagram/refresh/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_likes"], 60);
    assert_eq!(body["avg_likes"], 30.0);
    assert_eq!(body["avg_comments"], 2.0);
    assert_eq!(h.state.db.count_stats(&user_id, Platform::Instagram).unwrap(), 2);
}

// -- Disconnect --

#[tokio::test]
async fn disconnect_keeps_history_by_default() {
    let h = harness();
    let (user_id, token) = h.user("alice");

    h.send(post("/youtube/connect/", Some(&token), json!({"channel_id": "UC123"})))
        .await;
    let (status, body) = h.send(post("/youtube/disconnect/", Some(&token), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "YouTube disconnected successfully");

    let (_, body) = h.send(get("/youtube/status/", Some(&token))).await;
    assert_eq!(body["connected"], false);
    assert_eq!(body["handle"], Value::Null);

    let (_, body) = h.send(get("/youtube/stats/", Some(&token))).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    // A second disconnect finds nothing to remove.
    let (status, _) = h
        .send(send_json("DELETE", "/youtube/disconnect/", Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.state.db.count_stats(&user_id, Platform::YouTube).unwrap(), 1);
}

#[tokio::test]
async fn cascading_disconnect_drops_snapshots() {
    let h = harness_with(Config {
        cascade_snapshots_on_disconnect: true,
        ..Config::with_secret("test-secret")
    });
    let (user_id, token) = h.user("alice");

    h.send(post("/instagram/connect/", Some(&token), json!({"username": "chef", "password": "pw"})))
        .await;
    assert_eq!(h.state.db.count_stats(&user_id, Platform::Instagram).unwrap(), 1);

    let (status, _) = h
        .send(send_json("DELETE", "/instagram/disconnect/", Some(&token), json!({})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.state.db.count_stats(&user_id, Platform::Instagram).unwrap(), 0);

    let (_, body) = h.send(get("/api/account_status/", Some(&token))).await;
    assert_eq!(body["instagram"], false);
}
