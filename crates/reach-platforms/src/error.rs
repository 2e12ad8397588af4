use thiserror::Error;

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Error)]
pub enum PlatformError {
    /// Transport failure: DNS, TLS, connection reset, timeout.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The vendor answered with a non-success status. `body` is the vendor's
    /// own error text, passed through untouched.
    #[error("{platform} returned {status}: {body}")]
    Status {
        platform: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed {platform} payload: {reason}")]
    Malformed {
        platform: &'static str,
        reason: String,
    },

    /// The account, channel or profile asked for does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The vendor refused the supplied account credentials.
    #[error("{0}")]
    Auth(String),
}

impl PlatformError {
    pub(crate) fn malformed(platform: &'static str, reason: impl ToString) -> Self {
        Self::Malformed {
            platform,
            reason: reason.to_string(),
        }
    }
}
