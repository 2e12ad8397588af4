use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use reach_api::auth::{AppState, AppStateInner};
use reach_api::config::Config;
use reach_platforms::Platforms;
use reach_platforms::instagram::InstagramClient;
use reach_platforms::twitter::TwitterClient;
use reach_platforms::youtube::YouTubeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reach=debug,reach_api=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = Config::from_env()?;
    let db_path = std::env::var("REACH_DB_PATH").unwrap_or_else(|_| "reach.db".into());
    let host = std::env::var("REACH_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("REACH_PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()?;

    // Init database
    let db = reach_db::Database::open(&PathBuf::from(&db_path))?;

    // Vendor clients
    let platforms = Platforms {
        youtube: Arc::new(YouTubeClient::new(config.google.clone())?),
        twitter: Arc::new(TwitterClient::new(
            config.twitter.clone(),
            config.twitter_consumer.clone(),
        )?),
        instagram: Arc::new(InstagramClient::new()),
    };

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner { db, config, platforms });

    let app = reach_api::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Reach server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
