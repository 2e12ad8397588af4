use axum::{
    Extension, Json,
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::WithRejection;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};

use reach_db::models::{NewCredential, NewYouTubeStats, YouTubeStatsRow};
use reach_platforms::metrics::{Engagement, RECENT_POST_LIMIT};
use reach_platforms::pkce::random_token;
use reach_platforms::youtube::{self, ChannelReport, YouTubeAuth};
use reach_types::Platform;
use reach_types::api::{
    AuthorizationUrlResponse, CallbackQuery, Claims, ConnectResponse, MessageResponse,
    OAuthStateClaims, PlatformStatusResponse, RecentVideo, YouTubeConnectRequest,
    YouTubeRefreshResponse, YouTubeSnapshot,
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

const PLATFORM: Platform = Platform::YouTube;

/// Start the Google consent flow. The `state` handed to Google is a signed
/// token whose id is also recorded server-side, so it verifies offline and
/// still works only once.
pub async fn initiate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<AuthorizationUrlResponse>> {
    let user_id = claims.sub.to_string();
    let jti = random_token(16);

    let state_claims = OAuthStateClaims {
        sub: claims.sub,
        platform: PLATFORM.as_str().to_string(),
        jti: jti.clone(),
        exp: (Utc::now() + state.config.oauth_state_ttl).timestamp() as usize,
    };
    let signed_state = encode(
        &Header::default(),
        &state_claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("failed to sign OAuth state: {}", e))?;

    begin_pending(&state, &user_id, PLATFORM, &jti, None)?;

    let authorization_url = youtube::authorization_url(&state.config.google, &signed_state)
        .map_err(|e| anyhow::anyhow!("failed to build Google authorization URL: {}", e))?;

    info!("User {} started YouTube authorization", claims.username);
    Ok(Json(AuthorizationUrlResponse { authorization_url }))
}

pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Redirect> {
    let (code, signed_state) = callback_params(&query)?;

    let state_claims = decode::<OAuthStateClaims>(
        signed_state,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("Rejected YouTube OAuth state: {}", e);
        ApiError::BadRequest("Invalid or expired state".into())
    })?
    .claims;

    if state_claims.platform.parse::<Platform>().ok() != Some(PLATFORM) {
        return Err(ApiError::BadRequest("Invalid or expired state".into()));
    }

    let pending = consume_pending(&state, &state_claims.jti, PLATFORM)?;
    if pending.user_id != state_claims.sub.to_string() {
        warn!("YouTube OAuth state subject does not match its handshake");
        return Err(ApiError::BadRequest("Invalid or expired state".into()));
    }

    let user = callback_user(&state, &pending.user_id)?;

    let issued_at = Utc::now();
    let grant = state
        .platforms
        .youtube
        .exchange_code(code)
        .await
        .map_err(ApiError::from_token_exchange)?;

    // Record which channel the token speaks for, replacing any channel that
    // was linked by id before. A failed lookup does not undo the link.
    let channel_id = match state
        .platforms
        .youtube
        .fetch_channel(&YouTubeAuth::Bearer(grant.access_token.clone()))
        .await
    {
        Ok(report) => Some(report.channel_id),
        Err(e) => {
            warn!("YouTube channel lookup after authorization failed: {}", e);
            None
        }
    };

    let mut credential = grant_to_credential(&grant, issued_at);
    credential.account_handle = channel_id.clone();
    state
        .db
        .link_credential(&user.id, PLATFORM, &credential, channel_id.as_deref())?;

    info!("User {} linked YouTube", user.username);
    finish_redirect(&state, &user)
}

/// Link a channel by id, reading its public data with the server's API key.
pub async fn connect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<YouTubeConnectRequest>, ApiError>,
) -> ApiResult<Json<ConnectResponse<YouTubeSnapshot>>> {
    let channel_id = req.channel_id.trim();
    if channel_id.is_empty() {
        return Err(ApiError::BadRequest("channel_id is required".into()));
    }

    let report = state
        .platforms
        .youtube
        .fetch_channel(&YouTubeAuth::ApiKey {
            key: state.config.youtube_api_key.clone(),
            channel_id: channel_id.to_string(),
        })
        .await?;

    let user_id = claims.sub.to_string();
    let credential = NewCredential {
        account_handle: Some(report.channel_id.clone()),
        ..Default::default()
    };
    state
        .db
        .link_credential(&user_id, PLATFORM, &credential, Some(report.channel_id.as_str()))?;

    let snapshot = record_snapshot(&state, &user_id, &report)?;
    info!("User {} connected YouTube channel {}", claims.username, report.channel_id);

    Ok(Json(ConnectResponse {
        message: "YouTube account connected successfully".into(),
        snapshot,
    }))
}

/// Take a new snapshot and return it with the per-video numbers behind
/// the averages.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<YouTubeRefreshResponse>> {
    let user_id = claims.sub.to_string();
    let credential = require_credential(&state, &user_id, PLATFORM)?;

    let auth = match fresh_access_token(&state, &credential, PLATFORM).await? {
        Some(token) => YouTubeAuth::Bearer(token),
        None => {
            let channel_id = linked_handle(&state, &user_id, PLATFORM, Some(&credential))?
                .ok_or_else(|| ApiError::BadRequest("No YouTube channel linked".into()))?;
            YouTubeAuth::ApiKey {
                key: state.config.youtube_api_key.clone(),
                channel_id,
            }
        }
    };

    let report = state.platforms.youtube.fetch_channel(&auth).await?;
    let snapshot = record_snapshot(&state, &user_id, &report)?;
    let videos = report
        .videos
        .into_iter()
        .take(RECENT_POST_LIMIT)
        .map(|v| RecentVideo {
            title: v.title,
            views: v.views,
            likes: v.likes,
            comments: v.comments,
        })
        .collect();

    Ok(Json(YouTubeRefreshResponse { snapshot, videos }))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PlatformStatusResponse<YouTubeSnapshot>>> {
    let user_id = claims.sub.to_string();
    let credential = state.db.get_credential(&user_id, PLATFORM)?;
    let handle = match &credential {
        Some(c) => linked_handle(&state, &user_id, PLATFORM, Some(c))?,
        None => None,
    };
    let latest = state.db.latest_youtube_stats(&user_id)?.map(to_snapshot);

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
) -> ApiResult<Json<Vec<YouTubeSnapshot>>> {
    let rows = state.db.list_youtube_stats(&claims.sub.to_string())?;
    Ok(Json(rows.into_iter().map(to_snapshot).collect()))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    disconnect_platform(&state, &claims, PLATFORM)
}

fn record_snapshot(state: &AppState, user_id: &str, report: &ChannelReport) -> ApiResult<YouTubeSnapshot> {
    let engagement = Engagement::from_posts(report.videos.iter().map(|v| (v.likes, v.comments, v.views)));

    let row = state.db.insert_youtube_stats(
        user_id,
        &NewYouTubeStats {
            title: report.title.clone(),
            subscriber_count: report.subscriber_count,
            view_count: report.view_count,
            video_count: report.video_count,
            videos_checked: engagement.checked as i64,
            avg_views: engagement.avg_views(),
            avg_likes: engagement.avg_likes(),
            avg_comments: engagement.avg_comments(),
        },
    )?;
    Ok(to_snapshot(row))
}

fn to_snapshot(row: YouTubeStatsRow) -> YouTubeSnapshot {
    YouTubeSnapshot {
        recorded_at: recorded_at(&row.recorded_at),
        title: row.title,
        subscriber_count: row.subscriber_count,
        view_count: row.view_count,
        video_count: row.video_count,
        videos_checked: row.videos_checked,
        avg_views: row.avg_views,
        avg_likes: row.avg_likes,
        avg_comments: row.avg_comments,
    }
}
