use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS social_accounts (
            user_id             TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            youtube             INTEGER NOT NULL DEFAULT 0,
            twitter             INTEGER NOT NULL DEFAULT 0,
            instagram           INTEGER NOT NULL DEFAULT 0,
            youtube_channel_id  TEXT,
            twitter_username    TEXT,
            instagram_username  TEXT,
            updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS credentials (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            platform        TEXT NOT NULL,
            access_token    TEXT,
            refresh_token   TEXT,
            token_secret    TEXT,
            token_type      TEXT,
            expires_at      TEXT,
            scopes          TEXT,
            account_handle  TEXT,
            password        TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(user_id, platform)
        );

        CREATE TABLE IF NOT EXISTS oauth_pending (
            state           TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            platform        TEXT NOT NULL,
            code_verifier   TEXT,
            expires_at      TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Snapshots hang off the user rather than the credential, so a
        -- disconnect only removes them when asked to.
        CREATE TABLE IF NOT EXISTS youtube_stats (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title               TEXT NOT NULL,
            subscriber_count    INTEGER NOT NULL DEFAULT 0,
            view_count          INTEGER NOT NULL DEFAULT 0,
            video_count         INTEGER NOT NULL DEFAULT 0,
            videos_checked      INTEGER NOT NULL DEFAULT 0,
            avg_views           REAL NOT NULL DEFAULT 0,
            avg_likes           REAL NOT NULL DEFAULT 0,
            avg_comments        REAL NOT NULL DEFAULT 0,
            recorded_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_youtube_stats_user
            ON youtube_stats(user_id, recorded_at);

        CREATE TABLE IF NOT EXISTS twitter_stats (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            username            TEXT NOT NULL,
            followers_count     INTEGER NOT NULL DEFAULT 0,
            following_count     INTEGER NOT NULL DEFAULT 0,
            tweet_count         INTEGER NOT NULL DEFAULT 0,
            listed_count        INTEGER NOT NULL DEFAULT 0,
            tweets_checked      INTEGER NOT NULL DEFAULT 0,
            likes_count         INTEGER NOT NULL DEFAULT 0,
            retweets_count      INTEGER NOT NULL DEFAULT 0,
            avg_likes           REAL NOT NULL DEFAULT 0,
            avg_retweets        REAL NOT NULL DEFAULT 0,
            recorded_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_twitter_stats_user
            ON twitter_stats(user_id, recorded_at);

        CREATE TABLE IF NOT EXISTS instagram_stats (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            followers_count     INTEGER NOT NULL DEFAULT 0,
            following_count     INTEGER NOT NULL DEFAULT 0,
            post_count          INTEGER NOT NULL DEFAULT 0,
            total_posts_checked INTEGER NOT NULL DEFAULT 0,
            total_likes         INTEGER NOT NULL DEFAULT 0,
            total_comments      INTEGER NOT NULL DEFAULT 0,
            avg_likes           REAL NOT NULL DEFAULT 0,
            avg_comments        REAL NOT NULL DEFAULT 0,
            recorded_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_instagram_stats_user
            ON instagram_stats(user_id, recorded_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
