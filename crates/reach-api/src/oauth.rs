//! Pieces shared by the Twitter and YouTube authorization-code flows: the
//! single-use pending handshake, callback validation, and the redirect back
//! to the frontend.

use axum::response::Redirect;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use reach_db::format_timestamp;
use reach_db::models::{NewCredential, PendingOAuthRow, UserRow};
use reach_platforms::oauth2::TokenGrant;
use reach_types::Platform;
use reach_types::api::CallbackQuery;

use crate::auth::{AppState, issue_session};
use crate::error::{ApiError, ApiResult};

const INVALID_STATE: &str = "Invalid or expired state";

/// Pull `code` and `state` out of a vendor callback, rejecting denials.
pub(crate) fn callback_params(query: &CallbackQuery) -> ApiResult<(&str, &str)> {
    if let Some(error) = &query.error {
        let detail = query.error_description.as_deref().unwrap_or(error);
        return Err(ApiError::BadRequest(format!("Authorization failed: {}", detail)));
    }
    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing code".into()))?;
    let state = query
        .state
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing state".into()))?;
    Ok((code, state))
}

/// Record a handshake the callback must later consume. Stale handshakes are
/// swept on the way in.
pub(crate) fn begin_pending(
    state: &AppState,
    user_id: &str,
    platform: Platform,
    key: &str,
    code_verifier: Option<String>,
) -> ApiResult<()> {
    let now = Utc::now();
    let purged = state.db.purge_expired_oauth(&format_timestamp(now))?;
    if purged > 0 {
        debug!("Purged {} expired OAuth handshakes", purged);
    }

    state.db.insert_pending_oauth(&PendingOAuthRow {
        state: key.to_string(),
        user_id: user_id.to_string(),
        platform: platform.as_str().to_string(),
        code_verifier,
        expires_at: format_timestamp(now + state.config.oauth_state_ttl),
    })?;
    Ok(())
}

/// Take the pending handshake for `key`. The record is gone afterwards
/// whether or not it turns out to be usable.
pub(crate) fn consume_pending(state: &AppState, key: &str, platform: Platform) -> ApiResult<PendingOAuthRow> {
    let pending = state
        .db
        .take_pending_oauth(key)?
        .ok_or_else(|| ApiError::BadRequest(INVALID_STATE.into()))?;

    match pending.platform.parse::<Platform>() {
        Ok(started) if started == platform => {}
        Ok(started) => {
            warn!("OAuth state for {} presented to the {} callback", started, platform);
            return Err(ApiError::BadRequest(INVALID_STATE.into()));
        }
        Err(e) => {
            warn!("Pending OAuth handshake has {}", e);
            return Err(ApiError::BadRequest(INVALID_STATE.into()));
        }
    }

    let expired = match reach_db::parse_timestamp(&pending.expires_at) {
        Ok(at) => at <= Utc::now(),
        Err(e) => {
            warn!("Unreadable OAuth handshake expiry '{}': {}", pending.expires_at, e);
            true
        }
    };
    if expired {
        return Err(ApiError::BadRequest(INVALID_STATE.into()));
    }

    Ok(pending)
}

/// The user a callback is about. They may have been removed while the
/// browser was away at the vendor.
pub(crate) fn callback_user(state: &AppState, user_id: &str) -> ApiResult<UserRow> {
    state
        .db
        .get_user_by_id(user_id)?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))
}

pub(crate) fn grant_to_credential(grant: &TokenGrant, issued_at: DateTime<Utc>) -> NewCredential {
    NewCredential {
        access_token: Some(grant.access_token.clone()),
        refresh_token: grant.refresh_token.clone(),
        token_type: grant.token_type.clone(),
        expires_at: grant.expires_at(issued_at).map(format_timestamp),
        scopes: grant.scope.clone(),
        ..Default::default()
    }
}

/// 303 back to the frontend, optionally carrying a fresh session.
pub(crate) fn finish_redirect(state: &AppState, user: &UserRow) -> ApiResult<Redirect> {
    let target = &state.config.frontend_redirect_url;
    if !state.config.issue_session_on_callback {
        return Ok(Redirect::to(target));
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;
    let (access, refresh) = issue_session(&state.config, user_id, &user.username)?;

    let separator = if target.contains('?') { '&' } else { '?' };
    Ok(Redirect::to(&format!(
        "{}{}access={}&refresh={}",
        target,
        separator,
        urlencoding::encode(&access),
        urlencoding::encode(&refresh)
    )))
}
