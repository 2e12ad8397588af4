//! Engagement aggregation over a bounded page of recent posts.

/// How many of the most recent posts, videos or tweets feed the averages.
pub const RECENT_POST_LIMIT: usize = 20;

/// Arithmetic mean that is defined as zero for an empty sample.
pub fn mean(total: i64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

/// Sums of per-post counters over the posts that were looked at.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Engagement {
    pub checked: usize,
    pub likes: i64,
    pub comments: i64,
    pub views: i64,
}

impl Engagement {
    /// Aggregate `(likes, comments, views)` triples, newest first, looking at
    /// no more than `RECENT_POST_LIMIT` of them.
    pub fn from_posts<I>(posts: I) -> Self
    where
        I: IntoIterator<Item = (i64, i64, i64)>,
    {
        posts
            .into_iter()
            .take(RECENT_POST_LIMIT)
            .fold(Self::default(), |acc, (likes, comments, views)| Self {
                checked: acc.checked + 1,
                likes: acc.likes + likes,
                comments: acc.comments + comments,
                views: acc.views + views,
            })
    }

    pub fn avg_likes(&self) -> f64 {
        mean(self.likes, self.checked)
    }

    pub fn avg_comments(&self) -> f64 {
        mean(self.comments, self.checked)
    }

    pub fn avg_views(&self) -> f64 {
        mean(self.views, self.checked)
    }
}
