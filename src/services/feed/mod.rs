use crate::algorithms::{CandidateSelector, LatentFactorModel};
use crate::config::FeedConfig;
use crate::error::Result;
use crate::models::*;
use crate::services::cache::{ScoreCache, Scores};
use crate::services::store::InteractionStore;
use crate::utils::sort_by_score_desc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builds personalized feeds: candidate retrieval, then latent factor re-ranking.
pub struct FeedRanker {
    store: Arc<dyn InteractionStore>,
    selector: CandidateSelector,
    cache: Option<Arc<dyn ScoreCache>>,
    config: FeedConfig,
}

impl FeedRanker {
    pub fn new(store: Arc<dyn InteractionStore>, config: FeedConfig) -> Self {
        let selector = CandidateSelector::new(store.clone(), config.retrieval_limit);
        Self {
            store,
            selector,
            cache: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ScoreCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Ordered post ids for `user_id`, at most `limit` of them, every one drawn
    /// from the candidate set.
    pub async fn build_feed(&self, user_id: UserId, limit: usize) -> Result<Vec<PostId>> {
        let start_time = Instant::now();

        let candidates = self.selector.gather(user_id, limit).await?;
        if candidates.is_empty() {
            info!("No feed candidates for user {}", user_id);
            return Ok(Vec::new());
        }
        let candidate_ids = candidates.ids();

        let mut model = LatentFactorModel::new(self.store.clone());
        model.load_users(&[user_id]).await?;
        model.load_items(&candidate_ids).await?;

        let k = self.config.latent_factors;
        let mut scored = self.scores(model, user_id, k, &candidate_ids).await?;

        sort_by_score_desc(&mut scored);
        let feed: Vec<PostId> = scored.into_iter().map(|(post_id, _)| post_id).take(limit).collect();

        info!(
            "Built feed for user {}: {} candidates, {} posts in {}ms",
            user_id,
            candidate_ids.len(),
            feed.len(),
            start_time.elapsed().as_millis()
        );
        Ok(feed)
    }

    async fn scores(
        &self,
        model: LatentFactorModel,
        user_id: UserId,
        k: usize,
        candidates: &[PostId],
    ) -> Result<Scores> {
        let key = model.working_set_key(user_id, k, candidates);

        if let Some(cache) = &self.cache {
            match cache.get(key).await {
                Ok(Some(scores)) if covers_candidates(&scores, candidates) => {
                    debug!("Score cache hit for user {} (key {:016x})", user_id, key);
                    return Ok(scores);
                }
                Ok(Some(_)) => warn!(
                    "Score cache entry {:016x} does not match the candidates, recomputing",
                    key
                ),
                Ok(None) => {}
                Err(e) => warn!("Score cache read failed, recomputing: {}", e),
            }
        }

        let scores = if self.config.offload_factorization {
            let candidates = candidates.to_vec();
            tokio::task::spawn_blocking(move || model.rank(user_id, k, &candidates)).await??
        } else {
            model.rank(user_id, k, candidates)?
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(key, &scores).await {
                warn!("Score cache write failed: {}", e);
            }
        }

        Ok(scores)
    }
}

/// Cached scores are only usable when they are for exactly these candidates, in order.
fn covers_candidates(scores: &[(PostId, f64)], candidates: &[PostId]) -> bool {
    scores.iter().map(|(post_id, _)| *post_id).eq(candidates.iter().copied())
}
