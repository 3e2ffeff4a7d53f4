use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

pub type UserId = i64;
pub type PostId = i64;

/// A post together with its aggregate like count. `None` means no likes were recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPopularity {
    pub post_id: PostId,
    pub like_cnt: Option<i64>,
}

impl PostPopularity {
    pub fn new(post_id: PostId, like_cnt: Option<i64>) -> Self {
        Self { post_id, like_cnt }
    }

    /// Sort key used by popularity queries: missing counts rank below zero.
    pub fn like_rank(&self) -> i64 {
        self.like_cnt.unwrap_or(-1)
    }
}

impl From<(PostId, i64)> for PostPopularity {
    fn from((post_id, like_cnt): (PostId, i64)) -> Self {
        Self::new(post_id, Some(like_cnt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FollowEdge {
    pub follower_id: UserId,
    pub followed_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Play,
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(InteractionKind::Like),
            "play" => Ok(InteractionKind::Play),
            other => Err(format!("unknown interaction kind: {}", other)),
        }
    }
}

/// One implicit-feedback observation. Several records may exist for the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user_id: UserId,
    pub post_id: PostId,
    pub weight: f32,
}

impl InteractionRecord {
    pub fn new(user_id: UserId, post_id: PostId, weight: f32) -> Self {
        Self {
            user_id,
            post_id,
            weight,
        }
    }
}

/// Deduplicated candidate posts in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    entries: Vec<PostPopularity>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the post unless its id is already present. Returns whether it was added.
    pub(crate) fn push_unique(&mut self, seen: &mut HashSet<PostId>, entry: PostPopularity) -> bool {
        if seen.insert(entry.post_id) {
            self.entries.push(entry);
            true
        } else {
            false
        }
    }

    pub fn ids(&self) -> Vec<PostId> {
        self.entries.iter().map(|e| e.post_id).collect()
    }

    pub fn entries(&self) -> &[PostPopularity] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub user_id: UserId,
    #[serde(rename = "postIdArr")]
    pub post_ids: Vec<PostId>,
    pub generated_at: DateTime<Utc>,
}

impl FeedResponse {
    pub fn new(user_id: UserId, post_ids: Vec<PostId>) -> Self {
        Self {
            user_id,
            post_ids,
            generated_at: Utc::now(),
        }
    }
}
