use crate::models::{
    CredentialRow, InstagramStatsRow, NewCredential, NewInstagramStats, NewTwitterStats,
    NewYouTubeStats, PendingOAuthRow, SocialAccountRow, TwitterStatsRow, UserRow, YouTubeStatsRow,
};
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::Utc;
use reach_types::Platform;
use rusqlite::{Connection, Row};
use tracing::debug;

impl Database {
    // -- Users --

    /// Insert a user. Returns `false` when the username is already taken.
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, username, email, password_hash],
            ) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Social accounts --

    pub fn get_social_account(&self, user_id: &str) -> Result<Option<SocialAccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, youtube, twitter, instagram,
                        youtube_channel_id, twitter_username, instagram_username
                 FROM social_accounts WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(SocialAccountRow {
                        user_id: row.get(0)?,
                        youtube: row.get(1)?,
                        twitter: row.get(2)?,
                        instagram: row.get(3)?,
                        youtube_channel_id: row.get(4)?,
                        twitter_username: row.get(5)?,
                        instagram_username: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Credentials --

    pub fn get_credential(&self, user_id: &str, platform: Platform) -> Result<Option<CredentialRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, platform, access_token, refresh_token, token_secret, token_type,
                        expires_at, scopes, account_handle, password, created_at, updated_at
                 FROM credentials WHERE user_id = ?1 AND platform = ?2",
                (user_id, platform.as_str()),
                |row| {
                    Ok(CredentialRow {
                        user_id: row.get(0)?,
                        platform: row.get(1)?,
                        access_token: row.get(2)?,
                        refresh_token: row.get(3)?,
                        token_secret: row.get(4)?,
                        token_type: row.get(5)?,
                        expires_at: row.get(6)?,
                        scopes: row.get(7)?,
                        account_handle: row.get(8)?,
                        password: row.get(9)?,
                        created_at: row.get(10)?,
                        updated_at: row.get(11)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn count_credentials(&self, user_id: &str, platform: Platform) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM credentials WHERE user_id = ?1 AND platform = ?2",
                (user_id, platform.as_str()),
                |row| row.get(0),
            )?)
        })
    }

    /// Upsert the credential and mark the platform as linked, in one
    /// transaction. `handle` (channel id or username) is recorded on the
    /// social account when given. A stored refresh token survives only an
    /// OAuth2 grant replacing another OAuth2 grant.
    pub fn link_credential(
        &self,
        user_id: &str,
        platform: Platform,
        credential: &NewCredential,
        handle: Option<&str>,
    ) -> Result<()> {
        let now = format_timestamp(Utc::now());
        let (flag, handle_column) = link_columns(platform);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO credentials (user_id, platform, access_token, refresh_token, token_secret,
                                          token_type, expires_at, scopes, account_handle, password,
                                          created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(user_id, platform) DO UPDATE SET
                    access_token   = excluded.access_token,
                    refresh_token  = CASE
                                        WHEN excluded.access_token IS NOT NULL
                                             AND excluded.token_secret IS NULL
                                             AND credentials.access_token IS NOT NULL
                                             AND credentials.token_secret IS NULL
                                        THEN COALESCE(excluded.refresh_token, credentials.refresh_token)
                                        ELSE excluded.refresh_token
                                     END,
                    token_secret   = excluded.token_secret,
                    token_type     = excluded.token_type,
                    expires_at     = excluded.expires_at,
                    scopes         = excluded.scopes,
                    account_handle = COALESCE(excluded.account_handle, credentials.account_handle),
                    password       = excluded.password,
                    updated_at     = excluded.updated_at",
                rusqlite::params![
                    user_id,
                    platform.as_str(),
                    credential.access_token,
                    credential.refresh_token,
                    credential.token_secret,
                    credential.token_type,
                    credential.expires_at,
                    credential.scopes,
                    credential.account_handle,
                    credential.password,
                    now,
                ],
            )?;

            // Column names come from a fixed table, never from input.
            tx.execute(
                &format!(
                    "INSERT INTO social_accounts (user_id, {flag}, {handle_column}, updated_at)
                     VALUES (?1, 1, ?2, ?3)
                     ON CONFLICT(user_id) DO UPDATE SET
                        {flag} = 1,
                        {handle_column} = COALESCE(excluded.{handle_column}, social_accounts.{handle_column}),
                        updated_at = excluded.updated_at"
                ),
                rusqlite::params![user_id, handle, now],
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Store a refreshed token set. A `None` refresh token keeps the stored one.
    pub fn update_credential_tokens(
        &self,
        user_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<&str>,
    ) -> Result<bool> {
        let now = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE credentials SET
                    access_token  = ?3,
                    refresh_token = COALESCE(?4, refresh_token),
                    expires_at    = ?5,
                    updated_at    = ?6
                 WHERE user_id = ?1 AND platform = ?2",
                rusqlite::params![user_id, platform.as_str(), access_token, refresh_token, expires_at, now],
            )?;
            Ok(updated > 0)
        })
    }

    /// Remove the credential and clear the platform flag. Returns `false`
    /// (and touches nothing) when there was no credential to remove.
    pub fn disconnect(&self, user_id: &str, platform: Platform, drop_snapshots: bool) -> Result<bool> {
        let now = format_timestamp(Utc::now());
        let (flag, handle_column) = link_columns(platform);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM credentials WHERE user_id = ?1 AND platform = ?2",
                (user_id, platform.as_str()),
            )?;
            if removed == 0 {
                return Ok(false);
            }

            tx.execute(
                &format!(
                    "UPDATE social_accounts SET {flag} = 0, {handle_column} = NULL, updated_at = ?2
                     WHERE user_id = ?1"
                ),
                (user_id, &now),
            )?;

            if drop_snapshots {
                let dropped = tx.execute(
                    &format!("DELETE FROM {} WHERE user_id = ?1", stats_table(platform)),
                    [user_id],
                )?;
                debug!("Dropped {} {} snapshots for {}", dropped, platform, user_id);
            }

            tx.commit()?;
            Ok(true)
        })
    }

    // -- Pending OAuth handshakes --

    pub fn insert_pending_oauth(&self, pending: &PendingOAuthRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO oauth_pending (state, user_id, platform, code_verifier, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    pending.state,
                    pending.user_id,
                    pending.platform,
                    pending.code_verifier,
                    pending.expires_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Remove and return the pending handshake for `state`. A state can be
    /// taken at most once.
    pub fn take_pending_oauth(&self, state: &str) -> Result<Option<PendingOAuthRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "DELETE FROM oauth_pending WHERE state = ?1
                 RETURNING state, user_id, platform, code_verifier, expires_at",
                [state],
                |row| {
                    Ok(PendingOAuthRow {
                        state: row.get(0)?,
                        user_id: row.get(1)?,
                        platform: row.get(2)?,
                        code_verifier: row.get(3)?,
                        expires_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn purge_expired_oauth(&self, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM oauth_pending WHERE expires_at < ?1", [now])?)
        })
    }

    // -- Snapshots --

    pub fn count_stats(&self, user_id: &str, platform: Platform) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE user_id = ?1", stats_table(platform)),
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn insert_youtube_stats(&self, user_id: &str, stats: &NewYouTubeStats) -> Result<YouTubeStatsRow> {
        let recorded_at = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO youtube_stats (user_id, title, subscriber_count, view_count, video_count,
                                            videos_checked, avg_views, avg_likes, avg_comments, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    user_id,
                    stats.title,
                    stats.subscriber_count,
                    stats.view_count,
                    stats.video_count,
                    stats.videos_checked,
                    stats.avg_views,
                    stats.avg_likes,
                    stats.avg_comments,
                    recorded_at,
                ],
            )?;
            Ok(YouTubeStatsRow {
                id: conn.last_insert_rowid(),
                user_id: user_id.to_string(),
                title: stats.title.clone(),
                subscriber_count: stats.subscriber_count,
                view_count: stats.view_count,
                video_count: stats.video_count,
                videos_checked: stats.videos_checked,
                avg_views: stats.avg_views,
                avg_likes: stats.avg_likes,
                avg_comments: stats.avg_comments,
                recorded_at,
            })
        })
    }

    pub fn list_youtube_stats(&self, user_id: &str) -> Result<Vec<YouTubeStatsRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, subscriber_count, view_count, video_count,
                        videos_checked, avg_views, avg_likes, avg_comments, recorded_at
                 FROM youtube_stats WHERE user_id = ?1
                 ORDER BY recorded_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([user_id], youtube_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_youtube_stats(&self, user_id: &str) -> Result<Option<YouTubeStatsRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, title, subscriber_count, view_count, video_count,
                        videos_checked, avg_views, avg_likes, avg_comments, recorded_at
                 FROM youtube_stats WHERE user_id = ?1
                 ORDER BY recorded_at DESC, id DESC LIMIT 1",
                [user_id],
                youtube_row,
            )
            .optional()
        })
    }

    pub fn insert_twitter_stats(&self, user_id: &str, stats: &NewTwitterStats) -> Result<TwitterStatsRow> {
        let recorded_at = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO twitter_stats (user_id, username, followers_count, following_count, tweet_count,
                                            listed_count, tweets_checked, likes_count, retweets_count,
                                            avg_likes, avg_retweets, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    user_id,
                    stats.username,
                    stats.followers_count,
                    stats.following_count,
                    stats.tweet_count,
                    stats.listed_count,
                    stats.tweets_checked,
                    stats.likes_count,
                    stats.retweets_count,
                    stats.avg_likes,
                    stats.avg_retweets,
                    recorded_at,
                ],
            )?;
            Ok(TwitterStatsRow {
                id: conn.last_insert_rowid(),
                user_id: user_id.to_string(),
                username: stats.username.clone(),
                followers_count: stats.followers_count,
                following_count: stats.following_count,
                tweet_count: stats.tweet_count,
                listed_count: stats.listed_count,
                tweets_checked: stats.tweets_checked,
                likes_count: stats.likes_count,
                retweets_count: stats.retweets_count,
                avg_likes: stats.avg_likes,
                avg_retweets: stats.avg_retweets,
                recorded_at,
            })
        })
    }

    pub fn list_twitter_stats(&self, user_id: &str) -> Result<Vec<TwitterStatsRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, username, followers_count, following_count, tweet_count,
                        listed_count, tweets_checked, likes_count, retweets_count,
                        avg_likes, avg_retweets, recorded_at
                 FROM twitter_stats WHERE user_id = ?1
                 ORDER BY recorded_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([user_id], twitter_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_twitter_stats(&self, user_id: &str) -> Result<Option<TwitterStatsRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, username, followers_count, following_count, tweet_count,
                        listed_count, tweets_checked, likes_count, retweets_count,
                        avg_likes, avg_retweets, recorded_at
                 FROM twitter_stats WHERE user_id = ?1
                 ORDER BY recorded_at DESC, id DESC LIMIT 1",
                [user_id],
                twitter_row,
            )
            .optional()
        })
    }

    pub fn insert_instagram_stats(
        &self,
        user_id: &str,
        stats: &NewInstagramStats,
    ) -> Result<InstagramStatsRow> {
        let recorded_at = format_timestamp(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO instagram_stats (user_id, followers_count, following_count, post_count,
                                              total_posts_checked, total_likes, total_comments,
                                              avg_likes, avg_comments, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    user_id,
                    stats.followers_count,
                    stats.following_count,
                    stats.post_count,
                    stats.total_posts_checked,
                    stats.total_likes,
                    stats.total_comments,
                    stats.avg_likes,
                    stats.avg_comments,
                    recorded_at,
                ],
            )?;
            Ok(InstagramStatsRow {
                id: conn.last_insert_rowid(),
                user_id: user_id.to_string(),
                followers_count: stats.followers_count,
                following_count: stats.following_count,
                post_count: stats.post_count,
                total_posts_checked: stats.total_posts_checked,
                total_likes: stats.total_likes,
                total_comments: stats.total_comments,
                avg_likes: stats.avg_likes,
                avg_comments: stats.avg_comments,
                recorded_at,
            })
        })
    }

    pub fn list_instagram_stats(&self, user_id: &str) -> Result<Vec<InstagramStatsRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, followers_count, following_count, post_count,
                        total_posts_checked, total_likes, total_comments,
                        avg_likes, avg_comments, recorded_at
                 FROM instagram_stats WHERE user_id = ?1
                 ORDER BY recorded_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([user_id], instagram_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_instagram_stats(&self, user_id: &str) -> Result<Option<InstagramStatsRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, followers_count, following_count, post_count,
                        total_posts_checked, total_likes, total_comments,
                        avg_likes, avg_comments, recorded_at
                 FROM instagram_stats WHERE user_id = ?1
                 ORDER BY recorded_at DESC, id DESC LIMIT 1",
                [user_id],
                instagram_row,
            )
            .optional()
        })
    }
}

/// (flag column, identifier column) on `social_accounts` for a platform.
fn link_columns(platform: Platform) -> (&'static str, &'static str) {
    match platform {
        Platform::YouTube => ("youtube", "youtube_channel_id"),
        Platform::Twitter => ("twitter", "twitter_username"),
        Platform::Instagram => ("instagram", "instagram_username"),
    }
}

fn stats_table(platform: Platform) -> &'static str {
    match platform {
        Platform::YouTube => "youtube_stats",
        Platform::Twitter => "twitter_stats",
        Platform::Instagram => "instagram_stats",
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, email, password, created_at FROM users WHERE {} = ?1",
        column
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn youtube_row(row: &Row<'_>) -> rusqlite::Result<YouTubeStatsRow> {
    Ok(YouTubeStatsRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        subscriber_count: row.get(3)?,
        view_count: row.get(4)?,
        video_count: row.get(5)?,
        videos_checked: row.get(6)?,
        avg_views: row.get(7)?,
        avg_likes: row.get(8)?,
        avg_comments: row.get(9)?,
        recorded_at: row.get(10)?,
    })
}

fn twitter_row(row: &Row<'_>) -> rusqlite::Result<TwitterStatsRow> {
    Ok(TwitterStatsRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        followers_count: row.get(3)?,
        following_count: row.get(4)?,
        tweet_count: row.get(5)?,
        listed_count: row.get(6)?,
        tweets_checked: row.get(7)?,
        likes_count: row.get(8)?,
        retweets_count: row.get(9)?,
        avg_likes: row.get(10)?,
        avg_retweets: row.get(11)?,
        recorded_at: row.get(12)?,
    })
}

fn instagram_row(row: &Row<'_>) -> rusqlite::Result<InstagramStatsRow> {
    Ok(InstagramStatsRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        followers_count: row.get(2)?,
        following_count: row.get(3)?,
        post_count: row.get(4)?,
        total_posts_checked: row.get(5)?,
        total_likes: row.get(6)?,
        total_comments: row.get(7)?,
        avg_likes: row.get(8)?,
        avg_comments: row.get(9)?,
        recorded_at: row.get(10)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user(id: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user(id, &format!("user-{id}"), None, "hash").unwrap());
        db
    }

    fn oauth_credential(token: &str, refresh: Option<&str>) -> NewCredential {
        NewCredential {
            access_token: Some(token.to_string()),
            refresh_token: refresh.map(str::to_string),
            token_type: Some("bearer".into()),
            ..Default::default()
        }
    }

    #[test]
    fn relinking_updates_the_single_credential_row() {
        let db = db_with_user("u1");

        db.link_credential("u1", Platform::Twitter, &oauth_credential("first", Some("r1")), Some("alice"))
            .unwrap();
        db.link_credential("u1", Platform::Twitter, &oauth_credential("second", None), None)
            .unwrap();

        assert_eq!(db.count_credentials("u1", Platform::Twitter).unwrap(), 1);
        let cred = db.get_credential("u1", Platform::Twitter).unwrap().unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("second"));
        // no new refresh token issued: the old one survives
        assert_eq!(cred.refresh_token.as_deref(), Some("r1"));
        assert_eq!(cred.account_handle, None);

        let account = db.get_social_account("u1").unwrap().unwrap();
        assert!(account.twitter);
        assert!(!account.youtube);
        assert_eq!(account.twitter_username.as_deref(), Some("alice"));
    }

    #[test]
    fn duplicate_username_is_reported_not_raised() {
        let db = db_with_user("u1");
        assert!(!db.create_user("u2", "user-u1", None, "hash").unwrap());
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn refresh_token_does_not_outlive_its_kind_of_credential() {
        let db = db_with_user("u1");

        // A channel linked by id replaces the OAuth2 grant entirely.
        db.link_credential("u1", Platform::YouTube, &oauth_credential("yt", Some("yt-r")), None)
            .unwrap();
        let by_id = NewCredential { account_handle: Some("UC1".into()), ..Default::default() };
        db.link_credential("u1", Platform::YouTube, &by_id, Some("UC1")).unwrap();
        let cred = db.get_credential("u1", Platform::YouTube).unwrap().unwrap();
        assert_eq!(cred.access_token, None);
        assert_eq!(cred.refresh_token, None);

        // Same for OAuth1 tokens replacing an OAuth2 grant.
        db.link_credential("u1", Platform::Twitter, &oauth_credential("tw", Some("tw-r")), None)
            .unwrap();
        let oauth1 = NewCredential {
            access_token: Some("tok".into()),
            token_secret: Some("sec".into()),
            account_handle: Some("alice".into()),
            ..Default::default()
        };
        db.link_credential("u1", Platform::Twitter, &oauth1, Some("alice")).unwrap();
        let cred = db.get_credential("u1", Platform::Twitter).unwrap().unwrap();
        assert_eq!(cred.token_secret.as_deref(), Some("sec"));
        assert_eq!(cred.refresh_token, None);

        // A later OAuth2 grant without a refresh token has nothing to inherit.
        db.link_credential("u1", Platform::Twitter, &oauth_credential("tw2", None), None)
            .unwrap();
        let cred = db.get_credential("u1", Platform::Twitter).unwrap().unwrap();
        assert_eq!(cred.token_secret, None);
        assert_eq!(cred.refresh_token, None);
        // The handle given with the OAuth1 tokens stays.
        assert_eq!(cred.account_handle.as_deref(), Some("alice"));
    }

    #[test]
    fn disconnect_without_credential_changes_nothing() {
        let db = db_with_user("u1");
        assert!(!db.disconnect("u1", Platform::Instagram, true).unwrap());
        assert!(db.get_social_account("u1").unwrap().is_none());
    }

    #[test]
    fn disconnect_keeps_snapshots_unless_asked() {
        let db = db_with_user("u1");
        let stats = NewYouTubeStats { title: "chan".into(), subscriber_count: 10, ..Default::default() };

        db.link_credential("u1", Platform::YouTube, &NewCredential::default(), Some("UC1")).unwrap();
        db.insert_youtube_stats("u1", &stats).unwrap();
        assert!(db.disconnect("u1", Platform::YouTube, false).unwrap());
        assert_eq!(db.count_stats("u1", Platform::YouTube).unwrap(), 1);

        let account = db.get_social_account("u1").unwrap().unwrap();
        assert!(!account.youtube);
        assert_eq!(account.youtube_channel_id, None);

        db.link_credential("u1", Platform::YouTube, &NewCredential::default(), Some("UC1")).unwrap();
        assert!(db.disconnect("u1", Platform::YouTube, true).unwrap());
        assert_eq!(db.count_stats("u1", Platform::YouTube).unwrap(), 0);
    }

    #[test]
    fn snapshots_list_oldest_first() {
        let db = db_with_user("u1");
        for followers in [5, 7, 6] {
            let stats = NewInstagramStats { followers_count: followers, ..Default::default() };
            db.insert_instagram_stats("u1", &stats).unwrap();
        }

        let rows = db.list_instagram_stats("u1").unwrap();
        let followers: Vec<i64> = rows.iter().map(|r| r.followers_count).collect();
        assert_eq!(followers, vec![5, 7, 6]);
        assert!(rows.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));

        let latest = db.latest_instagram_stats("u1").unwrap().unwrap();
        assert_eq!(latest.followers_count, 6);
    }

    #[test]
    fn pending_oauth_is_single_use() {
        let db = db_with_user("u1");
        db.insert_pending_oauth(&PendingOAuthRow {
            state: "abc".into(),
            user_id: "u1".into(),
            platform: "twitter".into(),
            code_verifier: Some("verifier".into()),
            expires_at: "2999-01-01T00:00:00.000000Z".into(),
        })
        .unwrap();

        let taken = db.take_pending_oauth("abc").unwrap().unwrap();
        assert_eq!(taken.code_verifier.as_deref(), Some("verifier"));
        assert!(db.take_pending_oauth("abc").unwrap().is_none());
    }

    #[test]
    fn token_refresh_keeps_refresh_token_when_none_issued() {
        let db = db_with_user("u1");
        db.link_credential("u1", Platform::YouTube, &oauth_credential("old", Some("keep")), None)
            .unwrap();

        assert!(db
            .update_credential_tokens("u1", Platform::YouTube, "new", None, Some("2030-01-01T00:00:00.000000Z"))
            .unwrap());
        let cred = db.get_credential("u1", Platform::YouTube).unwrap().unwrap();
        assert_eq!(cred.access_token.as_deref(), Some("new"));
        assert_eq!(cred.refresh_token.as_deref(), Some("keep"));

        assert!(!db.update_credential_tokens("u1", Platform::Twitter, "x", None, None).unwrap());
    }
}
