//! Clients for the third-party platforms a user can link, plus the OAuth
//! primitives they need. Each vendor sits behind an object-safe trait so the
//! API layer can be driven against fakes.

pub mod error;
mod http;
pub mod instagram;
pub mod metrics;
pub mod oauth1;
pub mod oauth2;
pub mod pkce;
pub mod twitter;
pub mod youtube;

use std::sync::Arc;

pub use error::{PlatformError, PlatformResult};
pub use instagram::InstagramApi;
pub use twitter::TwitterApi;
pub use youtube::YouTubeApi;

/// The set of vendor clients a server instance talks to.
#[derive(Clone)]
pub struct Platforms {
    pub youtube: Arc<dyn YouTubeApi>,
    pub twitter: Arc<dyn TwitterApi>,
    pub instagram: Arc<dyn InstagramApi>,
}
