use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use reach_db::Database;
use reach_platforms::Platforms;
use reach_types::api::{
    Claims, LoginRequest, LoginResponse, SignupRequest, SignupResponse, TokenRefreshRequest,
    TokenRefreshResponse,
};
use reach_types::models::TokenKind;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::middleware::decode_session;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
    pub platforms: Platforms,
}

pub async fn signup(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<SignupRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    // Validate input
    let username_chars = req.username.chars().count();
    if !(3..=32).contains(&username_chars) {
        return Err(ApiError::BadRequest("username must be 3 to 32 characters".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }

    // Check if username is taken
    if state.db.get_user_by_username(&req.username)?.is_some() {
        return Err(ApiError::BadRequest("Username already taken".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    let email = req.email.as_deref().filter(|e| !e.trim().is_empty());

    // A concurrent signup can still win the race to the UNIQUE index.
    if !state
        .db
        .create_user(&user_id.to_string(), &req.username, email, &password_hash)?
    {
        return Err(ApiError::BadRequest("Username already taken".into()));
    }

    info!("User {} signed up as {}", user_id, req.username);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully".into(),
            user_id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<Json<LoginResponse>> {
    let bad_credentials = || ApiError::Unauthorized("Incorrect username or password".into());

    let user = state
        .db
        .get_user_by_username(&req.username)?
        .ok_or_else(bad_credentials)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash for {} is corrupt: {}", user.id, e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| bad_credentials())?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let (access, refresh) = issue_session(&state.config, user_id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id,
        name: user.username,
        access,
        refresh,
    }))
}

/// Trade a refresh token for a new access token.
pub async fn refresh_session(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<TokenRefreshRequest>, ApiError>,
) -> ApiResult<Json<TokenRefreshResponse>> {
    let claims = decode_session(&state.config.jwt_secret, &req.refresh, TokenKind::Refresh)?;

    // The account may have gone away since the refresh token was issued.
    if state.db.get_user_by_id(&claims.sub.to_string())?.is_none() {
        return Err(ApiError::Unauthorized("User no longer exists".into()));
    }

    let access = create_token(
        &state.config.jwt_secret,
        claims.sub,
        &claims.username,
        TokenKind::Access,
        state.config.access_token_ttl,
    )?;

    Ok(Json(TokenRefreshResponse { access }))
}

/// A fresh (access, refresh) token pair.
pub fn issue_session(config: &Config, user_id: Uuid, username: &str) -> anyhow::Result<(String, String)> {
    let access = create_token(
        &config.jwt_secret,
        user_id,
        username,
        TokenKind::Access,
        config.access_token_ttl,
    )?;
    let refresh = create_token(
        &config.jwt_secret,
        user_id,
        username,
        TokenKind::Refresh,
        config.refresh_token_ttl,
    )?;
    Ok((access, refresh))
}

fn create_token(
    secret: &str,
    user_id: Uuid,
    username: &str,
    kind: TokenKind,
    ttl: Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        kind,
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
