//! Credential handling common to every platform: lookup, transparent token
//! refresh, status reads and disconnect.

use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use reach_db::models::CredentialRow;
use reach_db::{format_timestamp, parse_timestamp};
use reach_platforms::oauth2::{TokenGrant, needs_refresh};
use reach_types::Platform;
use reach_types::api::{AccountStatusResponse, Claims, MessageResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// The stored credential, or `NotConnected`.
pub(crate) fn require_credential(state: &AppState, user_id: &str, platform: Platform) -> ApiResult<CredentialRow> {
    state
        .db
        .get_credential(user_id, platform)?
        .ok_or(ApiError::NotConnected(platform))
}

/// The access token to call the vendor with. An OAuth2 token that is about
/// to expire is exchanged for a new one first, and the new set is stored
/// before it is used. Returns `None` when no access token is stored.
pub(crate) async fn fresh_access_token(
    state: &AppState,
    credential: &CredentialRow,
    platform: Platform,
) -> ApiResult<Option<String>> {
    let Some(access_token) = credential.access_token.clone() else {
        return Ok(None);
    };

    let expires_at = credential
        .expires_at
        .as_deref()
        .and_then(|raw| match parse_timestamp(raw) {
            Ok(at) => Some(at),
            Err(e) => {
                warn!("Unreadable {} token expiry '{}': {}", platform, raw, e);
                None
            }
        });

    if !needs_refresh(expires_at, Utc::now()) {
        return Ok(Some(access_token));
    }

    let Some(refresh_token) = credential.refresh_token.as_deref() else {
        // Nothing to refresh with; let the vendor decide.
        return Ok(Some(access_token));
    };

    let grant = refresh_grant(state, platform, refresh_token).await?;
    let new_expiry = grant.expires_at(Utc::now()).map(format_timestamp);
    state.db.update_credential_tokens(
        &credential.user_id,
        platform,
        &grant.access_token,
        grant.refresh_token.as_deref(),
        new_expiry.as_deref(),
    )?;
    info!("Refreshed {} access token for {}", platform, credential.user_id);

    Ok(Some(grant.access_token))
}

async fn refresh_grant(state: &AppState, platform: Platform, refresh_token: &str) -> ApiResult<TokenGrant> {
    let grant = match platform {
        Platform::YouTube => state.platforms.youtube.refresh_access_token(refresh_token).await?,
        Platform::Twitter => state.platforms.twitter.refresh_access_token(refresh_token).await?,
        Platform::Instagram => {
            return Err(ApiError::BadRequest("Instagram credentials cannot be refreshed".into()));
        }
    };
    Ok(grant)
}

/// Timestamp of a stored snapshot. Rows written by hand may not parse; they
/// sort first rather than failing the whole listing.
pub(crate) fn recorded_at(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|e| {
        warn!("Unreadable snapshot timestamp '{}': {}", raw, e);
        DateTime::<Utc>::default()
    })
}

/// Identifier shown for a linked account: the one on the social account row,
/// falling back to the credential's.
pub(crate) fn linked_handle(
    state: &AppState,
    user_id: &str,
    platform: Platform,
    credential: Option<&CredentialRow>,
) -> ApiResult<Option<String>> {
    let account = state.db.get_social_account(user_id)?;
    let from_account = account.and_then(|a| match platform {
        Platform::YouTube => a.youtube_channel_id,
        Platform::Twitter => a.twitter_username,
        Platform::Instagram => a.instagram_username,
    });
    Ok(from_account.or_else(|| credential.and_then(|c| c.account_handle.clone())))
}

pub(crate) fn disconnect_platform(
    state: &AppState,
    claims: &Claims,
    platform: Platform,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = claims.sub.to_string();
    let removed = state
        .db
        .disconnect(&user_id, platform, state.config.cascade_snapshots_on_disconnect)?;
    if !removed {
        return Err(ApiError::NotConnected(platform));
    }

    info!("User {} disconnected {}", claims.username, platform);
    Ok(Json(MessageResponse {
        message: format!("{} disconnected successfully", platform.display_name()),
    }))
}

pub async fn account_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<AccountStatusResponse>> {
    let status = state
        .db
        .get_social_account(&claims.sub.to_string())?
        .map(|a| AccountStatusResponse {
            youtube: a.youtube,
            twitter: a.twitter,
            instagram: a.instagram,
        })
        .unwrap_or_default();
    Ok(Json(status))
}

pub async fn health() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "ok".into(),
    })
}
