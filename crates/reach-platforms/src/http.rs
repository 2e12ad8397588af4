use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{PlatformError, PlatformResult};

pub(crate) const USER_AGENT: &str = concat!("reach/", env!("CARGO_PKG_VERSION"));

pub(crate) fn client() -> PlatformResult<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// Check the status of a vendor response and decode its JSON body.
///
/// Non-success statuses keep the vendor's body text so callers can echo it
/// back to the user.
pub(crate) async fn read_json<T>(platform: &'static str, res: reqwest::Response) -> PlatformResult<T>
where
    T: DeserializeOwned,
{
    let status = res.status();
    let body = res.text().await?;

    if !status.is_success() {
        warn!(platform, code = %status, "non-success vendor response");
        return Err(PlatformError::Status {
            platform,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| PlatformError::malformed(platform, e))
}
