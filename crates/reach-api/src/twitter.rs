use axum::{
    Extension, Json,
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use tracing::{info, warn};

use reach_db::models::{NewCredential, NewTwitterStats, TwitterStatsRow};
use reach_platforms::metrics::{RECENT_POST_LIMIT, mean};
use reach_platforms::pkce::{PkcePair, random_token};
use reach_platforms::twitter::{self, TwitterAuth, TwitterReport};
use reach_types::Platform;
use reach_types::api::{
    AuthorizationUrlResponse, CallbackQuery, Claims, ConnectResponse, MessageResponse,
    PlatformStatusResponse, TwitterConnectRequest, TwitterSnapshot,
};

use crate::auth::AppState;
use crate::connections::{
    disconnect_platform, fresh_access_token, linked_handle, recorded_at, require_credential,
};
use crate::error::{ApiError, ApiResult};
use crate::oauth::{
    begin_pending, callback_params, callback_user, consume_pending, finish_redirect,
    grant_to_credential,
};

const PLATFORM: Platform = Platform::Twitter;

/// Start an OAuth2 PKCE authorization. The verifier stays server-side,
/// keyed by the random `state`.
pub async fn initiate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<AuthorizationUrlResponse>> {
    let pkce = PkcePair::generate();
    let key = random_token(32);

    begin_pending(&state, &claims.sub.to_string(), PLATFORM, &key, Some(pkce.verifier))?;

    let authorization_url = twitter::authorization_url(&state.config.twitter, &key, &pkce.challenge)
        .map_err(|e| anyhow::anyhow!("failed to build Twitter authorization URL: {}", e))?;

    info!("User {} started Twitter authorization", claims.username);
    Ok(Json(AuthorizationUrlResponse { authorization_url }))
}

pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Redirect> {
    let (code, key) = callback_params(&query)?;

    let pending = consume_pending(&state, key, PLATFORM)?;
    let verifier = pending
        .code_verifier
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired state".into()))?;

    let user = callback_user(&state, &pending.user_id)?;

    let issued_at = Utc::now();
    let grant = state
        .platforms
        .twitter
        .exchange_code(code, verifier)
        .await
        .map_err(ApiError::from_token_exchange)?;

    // The handle is cosmetic; a failed lookup does not undo the link.
    let handle = match state
        .platforms
        .twitter
        .fetch_profile(&TwitterAuth::Bearer(grant.access_token.clone()))
        .await
    {
        Ok(report) => Some(report.username),
        Err(e) => {
            warn!("Twitter profile lookup after authorization failed: {}", e);
            None
        }
    };

    let mut credential = grant_to_credential(&grant, issued_at);
    credential.account_handle = handle.clone();
    state
        .db
        .link_credential(&user.id, PLATFORM, &credential, handle.as_deref())?;

    info!("User {} linked Twitter", user.username);
    finish_redirect(&state, &user)
}

/// Link with a legacy OAuth1 user token pair.
pub async fn connect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<TwitterConnectRequest>, ApiError>,
) -> ApiResult<Json<ConnectResponse<TwitterSnapshot>>> {
    let access_token = req.access_token.trim();
    let token_secret = req.access_token_secret.trim();
    if access_token.is_empty() {
        return Err(ApiError::BadRequest("access_token is required".into()));
    }
    if token_secret.is_empty() {
        return Err(ApiError::BadRequest("access_token_secret is required".into()));
    }

    let report = state
        .platforms
        .twitter
        .fetch_profile(&TwitterAuth::OAuth1 {
            token: access_token.to_string(),
            token_secret: token_secret.to_string(),
        })
        .await?;

    let user_id = claims.sub.to_string();
    let credential = NewCredential {
        access_token: Some(access_token.to_string()),
        token_secret: Some(token_secret.to_string()),
        token_type: Some("oauth1".into()),
        account_handle: Some(report.username.clone()),
        ..Default::default()
    };
    state
        .db
        .link_credential(&user_id, PLATFORM, &credential, Some(report.username.as_str()))?;

    let snapshot = record_snapshot(&state, &user_id, &report)?;
    info!("User {} connected Twitter account @{}", claims.username, report.username);

    Ok(Json(ConnectResponse {
        message: "Twitter account connected successfully".into(),
        snapshot,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<TwitterSnapshot>> {
    let user_id = claims.sub.to_string();
    let credential = require_credential(&state, &user_id, PLATFORM)?;

    let auth = match (&credential.access_token, &credential.token_secret) {
        (Some(token), Some(secret)) => TwitterAuth::OAuth1 {
            token: token.clone(),
            token_secret: secret.clone(),
        },
        _ => {
            let token = fresh_access_token(&state, &credential, PLATFORM)
                .await?
                .ok_or_else(|| ApiError::BadRequest("No Twitter token stored; reconnect the account".into()))?;
            TwitterAuth::Bearer(token)
        }
    };

    let report = state.platforms.twitter.fetch_profile(&auth).await?;
    let snapshot = record_snapshot(&state, &user_id, &report)?;
    Ok(Json(snapshot))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PlatformStatusResponse<TwitterSnapshot>>> {
    let user_id = claims.sub.to_string();
    let credential = state.db.get_credential(&user_id, PLATFORM)?;
    let handle = match &credential {
        Some(c) => linked_handle(&state, &user_id, PLATFORM, Some(c))?,
        None => None,
    };
    let latest = state.db.latest_twitter_stats(&user_id)?.map(to_snapshot);

    Ok(Json(PlatformStatusResponse {
        connected: credential.is_some(),
        handle,
        latest,
    }))
}

/// Every stored snapshot, oldest first.
pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<TwitterSnapshot>>> {
    let rows = state.db.list_twitter_stats(&claims.sub.to_string())?;
    Ok(Json(rows.into_iter().map(to_snapshot).collect()))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    disconnect_platform(&state, &claims, PLATFORM)
}

fn record_snapshot(state: &AppState, user_id: &str, report: &TwitterReport) -> ApiResult<TwitterSnapshot> {
    let recent = &report.tweets[..report.tweets.len().min(RECENT_POST_LIMIT)];
    let likes: i64 = recent.iter().map(|t| t.likes).sum();
    let retweets: i64 = recent.iter().map(|t| t.retweets).sum();

    let row = state.db.insert_twitter_stats(
        user_id,
        &NewTwitterStats {
            username: report.username.clone(),
            followers_count: report.followers_count,
            following_count: report.following_count,
            tweet_count: report.tweet_count,
            listed_count: report.listed_count,
            tweets_checked: recent.len() as i64,
            likes_count: likes,
            retweets_count: retweets,
            avg_likes: mean(likes, recent.len()),
            avg_retweets: mean(retweets, recent.len()),
        },
    )?;
    Ok(to_snapshot(row))
}

fn to_snapshot(row: TwitterStatsRow) -> TwitterSnapshot {
    TwitterSnapshot {
        recorded_at: recorded_at(&row.recorded_at),
        username: row.username,
        followers_count: row.followers_count,
        following_count: row.following_count,
        tweet_count: row.tweet_count,
        listed_count: row.listed_count,
        tweets_checked: row.tweets_checked,
        likes_count: row.likes_count,
        retweets_count: row.retweets_count,
        avg_likes: row.avg_likes,
        avg_retweets: row.avg_retweets,
    }
}
