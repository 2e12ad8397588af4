use axum::{Extension, Json, extract::State};
use axum_extra::extract::WithRejection;
use tracing::info;

use reach_db::models::{InstagramStatsRow, NewCredential, NewInstagramStats};
use reach_platforms::instagram::InstagramReport;
use reach_platforms::metrics::Engagement;
use reach_types::Platform;
use reach_types::api::{
    Claims, ConnectResponse, InstagramConnectRequest, InstagramSnapshot, MessageResponse,
    PlatformStatusResponse,
};

use crate::auth::AppState;
use crate::connections::{disconnect_platform, linked_handle, recorded_at, require_credential};
use crate::error::{ApiError, ApiResult};

const PLATFORM: Platform = Platform::Instagram;

/// Link an account by logging in to it. The login is kept so later
/// refreshes can open a new session.
pub async fn connect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<InstagramConnectRequest>, ApiError>,
) -> ApiResult<Json<ConnectResponse<InstagramSnapshot>>> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is required".into()));
    }
    if req.password.is_empty() {
        return Err(ApiError::BadRequest("password is required".into()));
    }

    let report = state
        .platforms
        .instagram
        .fetch_profile(username, &req.password)
        .await?;

    let user_id = claims.sub.to_string();
    let credential = NewCredential {
        account_handle: Some(report.username.clone()),
        password: Some(req.password.clone()),
        ..Default::default()
    };
    state
        .db
        .link_credential(&user_id, PLATFORM, &credential, Some(report.username.as_str()))?;

    let snapshot = record_snapshot(&state, &user_id, &report)?;
    info!("User {} connected Instagram account {}", claims.username, report.username);

    Ok(Json(ConnectResponse {
        message: "Instagram account connected successfully".into(),
        snapshot,
    }))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<InstagramSnapshot>> {
    let user_id = claims.sub.to_string();
    let credential = require_credential(&state, &user_id, PLATFORM)?;

    let username = linked_handle(&state, &user_id, PLATFORM, Some(&credential))?;
    let (Some(username), Some(password)) = (username, credential.password.as_deref()) else {
        return Err(ApiError::BadRequest(
            "Stored Instagram login is incomplete; reconnect the account".into(),
        ));
    };

    let report = state
        .platforms
        .instagram
        .fetch_profile(&username, password)
        .await?;
    let snapshot = record_snapshot(&state, &user_id, &report)?;
    Ok(Json(snapshot))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<PlatformStatusResponse<InstagramSnapshot>>> {
    let user_id = claims.sub.to_string();
    let credential = state.db.get_credential(&user_id, PLATFORM)?;
    let handle = match &credential {
        Some(c) => linked_handle(&state, &user_id, PLATFORM, Some(c))?,
        None => None,
    };
    let latest = state.db.latest_instagram_stats(&user_id)?.map(to_snapshot);

    Ok(Json(PlatformStatusResponse {
        connected: credential.is_some(),
        handle,
        latest,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<InstagramSnapshot>>> {
    let rows = state.db.list_instagram_stats(&claims.sub.to_string())?;
    Ok(Json(rows.into_iter().map(to_snapshot).collect()))
}

pub async fn disconnect(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    disconnect_platform(&state, &claims, PLATFORM)
}

fn record_snapshot(state: &AppState, user_id: &str, report: &InstagramReport) -> ApiResult<InstagramSnapshot> {
    let engagement = Engagement::from_posts(report.posts.iter().map(|p| (p.likes, p.comments, 0)));

    let row = state.db.insert_instagram_stats(
        user_id,
        &NewInstagramStats {
            followers_count: report.followers_count,
            following_count: report.following_count,
            post_count: report.post_count,
            total_posts_checked: engagement.checked as i64,
            total_likes: engagement.likes,
            total_comments: engagement.comments,
            avg_likes: engagement.avg_likes(),
            avg_comments: engagement.avg_comments(),
        },
    )?;
    Ok(to_snapshot(row))
}

fn to_snapshot(row: InstagramStatsRow) -> InstagramSnapshot {
    InstagramSnapshot {
        recorded_at: recorded_at(&row.recorded_at),
        followers_count: row.followers_count,
        following_count: row.following_count,
        post_count: row.post_count,
        total_posts_checked: row.total_posts_checked,
        total_likes: row.total_likes,
        total_comments: row.total_comments,
        avg_likes: row.avg_likes,
        avg_comments: row.avg_comments,
    }
}
