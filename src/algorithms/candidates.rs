use crate::error::Result;
use crate::models::*;
use crate::services::store::InteractionStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Merges the popularity pool and the friend pool into one bounded candidate set.
pub struct CandidateSelector {
    store: Arc<dyn InteractionStore>,
    retrieval_limit: usize,
}

impl CandidateSelector {
    pub fn new(store: Arc<dyn InteractionStore>, retrieval_limit: usize) -> Self {
        Self {
            store,
            retrieval_limit,
        }
    }

    /// Fetches both pools for `user_id` and merges them.
    pub async fn gather(&self, user_id: UserId, limit: usize) -> Result<CandidateSet> {
        if limit == 0 {
            return Ok(CandidateSet::new());
        }

        let (popular, followed) = futures::try_join!(
            self.store.fetch_top_posts(user_id, self.retrieval_limit),
            self.store.fetch_followed_posts(user_id, self.retrieval_limit),
        )?;

        debug!(
            "Candidate pools for user {}: popular={}, followed={}",
            user_id,
            popular.len(),
            followed.len()
        );

        Ok(Self::select(user_id, &popular, &followed, limit))
    }

    /// Order-preserving union, popularity pool first, truncated to `limit`.
    /// A post present in both pools keeps its first occurrence.
    pub fn select(
        _user_id: UserId,
        popularity_pool: &[PostPopularity],
        friend_pool: &[PostPopularity],
        limit: usize,
    ) -> CandidateSet {
        let mut candidates = CandidateSet::new();
        let mut seen = HashSet::new();

        for entry in popularity_pool.iter().chain(friend_pool.iter()) {
            if candidates.len() >= limit {
                break;
            }
            candidates.push_unique(&mut seen, *entry);
        }

        candidates
    }
}
