use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use reach_platforms::PlatformError;
use reach_types::Platform;
use reach_types::api::ErrorBody;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every handler failure. Rendered as `{"error": "..."}` with a status that
/// reflects the category.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    /// No credential stored for the platform. Distinct from a failure: the
    /// user simply has not linked it.
    #[error("{} not connected", .0.display_name())]
    NotConnected(Platform),

    #[error("{0}")]
    NotFound(String),

    /// A vendor call failed; `message` is the vendor's own text.
    #[error("{message}")]
    Vendor { status: StatusCode, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Token endpoint failures keep the vendor's status code so the caller
    /// sees exactly what the authorization server said.
    pub fn from_token_exchange(err: PlatformError) -> Self {
        match err {
            PlatformError::Status { status, body, .. } => Self::Vendor {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message: format!("Token exchange failed: {}", body),
            },
            other => other.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotConnected(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Vendor { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Data-call failures: vendor 4xx answers become 400, anything else on the
/// vendor side is a bad gateway.
impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Status { status, body, .. } => Self::Vendor {
                status: if (400..500).contains(&status) {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::BAD_GATEWAY
                },
                message: body,
            },
            PlatformError::NotFound(message) => Self::NotFound(message),
            PlatformError::Auth(message) => Self::BadRequest(message),
            other @ (PlatformError::Request(_) | PlatformError::Malformed { .. }) => Self::Vendor {
                status: StatusCode::BAD_GATEWAY,
                message: other.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            Self::Vendor { message, .. } => {
                warn!(code = %status, "Vendor error: {}", message);
                message.clone()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
