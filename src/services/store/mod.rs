pub mod postgres;

pub use postgres::PgInteractionStore;

use crate::error::{FeedError, Result};
use crate::models::*;
use crate::utils::validation::validate_interaction;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Read side of the interaction data the ranking core consumes.
#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    /// Posts not authored by `exclude_user_id`, most liked first.
    async fn fetch_top_posts(&self, exclude_user_id: UserId, limit: usize) -> Result<Vec<PostPopularity>>;

    /// Posts authored by users that `user_id` follows, most liked first.
    async fn fetch_followed_posts(&self, user_id: UserId, limit: usize) -> Result<Vec<PostPopularity>>;

    /// Every interaction made by any of `user_ids`.
    async fn fetch_user_interactions(&self, user_ids: &[UserId]) -> Result<Vec<InteractionRecord>>;

    /// Every interaction made on any of `post_ids`.
    async fn fetch_post_interactions(&self, post_ids: &[PostId]) -> Result<Vec<InteractionRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub post_id: PostId,
    pub author_id: UserId,
    pub like_cnt: Option<i64>,
}

/// Serializable dump of an in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub posts: Vec<PostRow>,
    #[serde(default)]
    pub follows: Vec<FollowEdge>,
    #[serde(default)]
    pub interactions: Vec<InteractionRecord>,
}

#[derive(Debug, Default)]
struct StoreData {
    posts: BTreeMap<PostId, PostRow>,
    follows: HashSet<FollowEdge>,
    interactions: Vec<InteractionRecord>,
}

/// Process-local store used by the CLI, tests and benchmarks.
#[derive(Debug, Default)]
pub struct InMemoryInteractionStore {
    data: RwLock<StoreData>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new();
        for post in snapshot.posts {
            store.add_post(post.post_id, post.author_id, post.like_cnt);
        }
        for edge in snapshot.follows {
            store.follow(edge.follower_id, edge.followed_id);
        }
        for record in snapshot.interactions {
            store.record_interaction(record)?;
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let data = self.data.read();
        StoreSnapshot {
            posts: data.posts.values().copied().collect(),
            follows: data.follows.iter().copied().collect(),
            interactions: data.interactions.clone(),
        }
    }

    pub fn add_post(&self, post_id: PostId, author_id: UserId, like_cnt: Option<i64>) {
        self.data.write().posts.insert(
            post_id,
            PostRow {
                post_id,
                author_id,
                like_cnt,
            },
        );
    }

    /// Returns false when the edge already existed.
    pub fn follow(&self, follower_id: UserId, followed_id: UserId) -> bool {
        self.data.write().follows.insert(FollowEdge {
            follower_id,
            followed_id,
        })
    }

    pub fn unfollow(&self, follower_id: UserId, followed_id: UserId) -> bool {
        self.data.write().follows.remove(&FollowEdge {
            follower_id,
            followed_id,
        })
    }

    pub fn record_interaction(&self, record: InteractionRecord) -> Result<()> {
        validate_interaction(&record).map_err(|e| FeedError::DataSource(e.to_string()))?;
        self.data.write().interactions.push(record);
        Ok(())
    }

    fn ranked_posts<F>(&self, limit: usize, keep: F) -> Vec<PostPopularity>
    where
        F: Fn(&StoreData, &PostRow) -> bool,
    {
        let guard = self.data.read();
        let data: &StoreData = &guard;
        let mut posts: Vec<PostPopularity> = data
            .posts
            .values()
            .filter(|row| keep(data, row))
            .map(|row| PostPopularity::new(row.post_id, row.like_cnt))
            .collect();

        // BTreeMap iteration is ascending by id, so a stable sort keeps id order on ties
        posts.sort_by(|a, b| b.like_rank().cmp(&a.like_rank()));
        posts.truncate(limit);
        posts
    }
}

#[async_trait::async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn fetch_top_posts(&self, exclude_user_id: UserId, limit: usize) -> Result<Vec<PostPopularity>> {
        Ok(self.ranked_posts(limit, |_, row| row.author_id != exclude_user_id))
    }

    async fn fetch_followed_posts(&self, user_id: UserId, limit: usize) -> Result<Vec<PostPopularity>> {
        Ok(self.ranked_posts(limit, |data, row| {
            data.follows.contains(&FollowEdge {
                follower_id: user_id,
                followed_id: row.author_id,
            })
        }))
    }

    async fn fetch_user_interactions(&self, user_ids: &[UserId]) -> Result<Vec<InteractionRecord>> {
        let wanted: HashSet<UserId> = user_ids.iter().copied().collect();
        let data = self.data.read();
        Ok(data
            .interactions
            .iter()
            .filter(|r| wanted.contains(&r.user_id))
            .copied()
            .collect())
    }

    async fn fetch_post_interactions(&self, post_ids: &[PostId]) -> Result<Vec<InteractionRecord>> {
        let wanted: HashSet<PostId> = post_ids.iter().copied().collect();
        let data = self.data.read();
        Ok(data
            .interactions
            .iter()
            .filter(|r| wanted.contains(&r.post_id))
            .copied()
            .collect())
    }
}
