use super::InteractionStore;
use crate::config::{FeedConfig, PostgresConfig};
use crate::error::{FeedError, Result};
use crate::models::*;
use crate::utils::validation::validate_interaction;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::str::FromStr;
use tracing::{info, warn};

const TOP_POSTS_SQL: &str = r#"
    SELECT tbl_post.post_id, view_like_count.like_cnt
    FROM tbl_post LEFT JOIN view_like_count
        ON tbl_post.post_id = view_like_count.post_id
    WHERE tbl_post.user_id != $1
    ORDER BY view_like_count.like_cnt DESC NULLS LAST, tbl_post.post_id ASC
    LIMIT $2
"#;

const FOLLOWED_POSTS_SQL: &str = r#"
    SELECT tbl_post.post_id, view_like_count.like_cnt
    FROM tbl_post LEFT JOIN view_like_count
        ON tbl_post.post_id = view_like_count.post_id
    WHERE tbl_post.user_id IN
        (SELECT followed_id FROM tbl_follow WHERE follower_id = $1)
    ORDER BY view_like_count.like_cnt DESC NULLS LAST, tbl_post.post_id ASC
    LIMIT $2
"#;

const USER_INTERACTIONS_SQL: &str = r#"
    SELECT user_id, post_id, 'like' AS kind FROM tbl_like WHERE user_id = ANY($1)
    UNION ALL
    SELECT user_id, post_id, 'play' AS kind FROM tbl_play_history WHERE user_id = ANY($1)
"#;

const POST_INTERACTIONS_SQL: &str = r#"
    SELECT user_id, post_id, 'like' AS kind FROM tbl_like WHERE post_id = ANY($1)
    UNION ALL
    SELECT user_id, post_id, 'play' AS kind FROM tbl_play_history WHERE post_id = ANY($1)
"#;

/// Postgres adapter. Raw rows are mapped and validated here so the ranking
/// core only ever sees typed records.
#[derive(Clone)]
pub struct PgInteractionStore {
    pool: PgPool,
    like_weight: f32,
    play_weight: f32,
}

impl PgInteractionStore {
    pub async fn connect(config: &PostgresConfig, feed: &FeedConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        info!("Connected interaction store (max_connections={})", config.max_connections);
        Ok(Self::with_pool(pool, feed))
    }

    pub fn with_pool(pool: PgPool, feed: &FeedConfig) -> Self {
        Self {
            pool,
            like_weight: feed.like_weight,
            play_weight: feed.play_weight,
        }
    }

    pub async fn record_play(&self, user_id: UserId, post_id: PostId) -> Result<()> {
        let result = sqlx::query("INSERT INTO tbl_play_history (user_id, post_id) VALUES ($1, $2)")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() != 1 {
            return Err(FeedError::DataSource(format!(
                "play history insert affected {} rows",
                result.rows_affected()
            )));
        }
        Ok(())
    }

    fn weight_for(&self, kind: InteractionKind) -> f32 {
        match kind {
            InteractionKind::Like => self.like_weight,
            InteractionKind::Play => self.play_weight,
        }
    }

    fn map_interactions(&self, rows: Vec<(i64, i64, String)>) -> Result<Vec<InteractionRecord>> {
        rows.into_iter()
            .map(|(user_id, post_id, kind)| {
                let kind = InteractionKind::from_str(&kind).map_err(FeedError::DataSource)?;
                let record = InteractionRecord::new(user_id, post_id, self.weight_for(kind));
                validate_interaction(&record).map_err(|e| FeedError::DataSource(e.to_string()))?;
                Ok(record)
            })
            .collect()
    }

    async fn fetch_posts(&self, sql: &str, user_id: UserId, limit: usize) -> Result<Vec<PostPopularity>> {
        let rows: Vec<(i64, Option<i64>)> = sqlx::query_as(sql)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(post_id, like_cnt)| {
                if matches!(like_cnt, Some(n) if n < 0) {
                    warn!("Negative like count for post {}, treating as missing", post_id);
                    PostPopularity::new(post_id, None)
                } else {
                    PostPopularity::new(post_id, like_cnt)
                }
            })
            .collect())
    }

    async fn fetch_interactions(&self, sql: &str, ids: &[i64]) -> Result<Vec<InteractionRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64, i64, String)> = sqlx::query_as(sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        self.map_interactions(rows)
    }
}

#[async_trait::async_trait]
impl InteractionStore for PgInteractionStore {
    async fn fetch_top_posts(&self, exclude_user_id: UserId, limit: usize) -> Result<Vec<PostPopularity>> {
        self.fetch_posts(TOP_POSTS_SQL, exclude_user_id, limit).await
    }

    async fn fetch_followed_posts(&self, user_id: UserId, limit: usize) -> Result<Vec<PostPopularity>> {
        self.fetch_posts(FOLLOWED_POSTS_SQL, user_id, limit).await
    }

    async fn fetch_user_interactions(&self, user_ids: &[UserId]) -> Result<Vec<InteractionRecord>> {
        self.fetch_interactions(USER_INTERACTIONS_SQL, user_ids).await
    }

    async fn fetch_post_interactions(&self, post_ids: &[PostId]) -> Result<Vec<InteractionRecord>> {
        self.fetch_interactions(POST_INTERACTIONS_SQL, post_ids).await
    }
}
