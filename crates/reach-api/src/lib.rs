pub mod auth;
pub mod config;
pub mod connections;
pub mod error;
pub mod instagram;
pub mod middleware;
mod oauth;
pub mod twitter;
pub mod youtube;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use auth::AppState;

/// Every HTTP route. Callbacks are public because the browser arrives there
/// from the vendor without our session; the pending handshake identifies
/// the user instead.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(connections::health))
        .route("/api/signup/", post(auth::signup))
        .route("/api/login/", post(auth::login))
        .route("/api/token/refresh/", post(auth::refresh_session))
        .route("/youtube/callback/", get(youtube::callback))
        .route("/twitter/callback/", get(twitter::callback));

    let protected_routes = Router::new()
        .route("/api/account_status/", get(connections::account_status))
        // YouTube
        .route("/youtube/initiate/", get(youtube::initiate))
        .route("/youtube/connect/", post(youtube::connect))
        .route("/youtube/status/", get(youtube::status))
        .route("/youtube/stats/", get(youtube::stats))
        .route("/youtube/refresh/", post(youtube::refresh))
        .route("/youtube/disconnect/", post(youtube::disconnect).delete(youtube::disconnect))
        // Twitter
        .route("/twitter/initiate/", get(twitter::initiate))
        .route("/twitter/connect/", post(twitter::connect))
        .route("/twitter/status/", get(twitter::status))
        .route("/twitter/stats/", get(twitter::stats))
        .route("/twitter/refresh/", post(twitter::refresh))
        .route("/twitter/disconnect/", post(twitter::disconnect).delete(twitter::disconnect))
        // Instagram
        .route("/instagram/connect/", post(instagram::connect))
        .route("/instagram/status/", get(instagram::status))
        .route("/instagram/stats/", get(instagram::stats))
        .route("/instagram/refresh/", post(instagram::refresh))
        .route("/instagram/disconnect/", post(instagram::disconnect).delete(instagram::disconnect))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
