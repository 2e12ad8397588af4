use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use reach_types::api::Claims;
use reach_types::models::TokenKind;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate an access JWT from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Authentication credentials were not provided".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Expected a Bearer token".into()))?;

    let claims = decode_session(&state.config.jwt_secret, token, TokenKind::Access)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Verify a session token's signature and expiry, and that it is of the
/// expected kind.
pub fn decode_session(secret: &str, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Token is invalid or expired".into()))?;

    if token_data.claims.kind != expected {
        return Err(ApiError::Unauthorized("Token is invalid or expired".into()));
    }
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::issue_session;
    use crate::config::Config;
    use uuid::Uuid;

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let config = Config::with_secret("test-secret");
        let user = Uuid::new_v4();
        let (access, refresh) = issue_session(&config, user, "alice").unwrap();

        let claims = decode_session("test-secret", &access, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.username, "alice");

        assert!(decode_session("test-secret", &refresh, TokenKind::Access).is_err());
        assert!(decode_session("test-secret", &access, TokenKind::Refresh).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let config = Config::with_secret("test-secret");
        let (access, _) = issue_session(&config, Uuid::new_v4(), "alice").unwrap();
        let err = decode_session("other-secret", &access, TokenKind::Access).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
