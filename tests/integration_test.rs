use feedrank::algorithms::CandidateSelector;
use feedrank::config::FeedConfig;
use feedrank::services::cache::MemoryScoreCache;
use feedrank::services::feed::FeedRanker;
use feedrank::services::store::{InMemoryInteractionStore, InteractionStore, StoreSnapshot};
use feedrank::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// Store returning fixed candidate pools, optionally failing every call.
struct FixedPoolStore {
    popular: Vec<PostPopularity>,
    followed: Vec<PostPopularity>,
    interactions: Vec<InteractionRecord>,
    fail: bool,
}

impl FixedPoolStore {
    fn new(popular: &[(PostId, i64)], followed: &[(PostId, i64)]) -> Self {
        Self {
            popular: popular.iter().map(|&p| p.into()).collect(),
            followed: followed.iter().map(|&p| p.into()).collect(),
            interactions: Vec::new(),
            fail: false,
        }
    }

    fn with_interactions(mut self, records: &[(UserId, PostId, f32)]) -> Self {
        self.interactions = records
            .iter()
            .map(|&(u, p, w)| InteractionRecord::new(u, p, w))
            .collect();
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn check(&self) -> Result<()> {
        if self.fail {
            Err(FeedError::DataSource("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl InteractionStore for FixedPoolStore {
    async fn fetch_top_posts(&self, _exclude: UserId, limit: usize) -> Result<Vec<PostPopularity>> {
        self.check()?;
        Ok(self.popular.iter().take(limit).copied().collect())
    }

    async fn fetch_followed_posts(&self, _user: UserId, limit: usize) -> Result<Vec<PostPopularity>> {
        self.check()?;
        Ok(self.followed.iter().take(limit).copied().collect())
    }

    async fn fetch_user_interactions(&self, user_ids: &[UserId]) -> Result<Vec<InteractionRecord>> {
        self.check()?;
        Ok(self
            .interactions
            .iter()
            .filter(|r| user_ids.contains(&r.user_id))
            .copied()
            .collect())
    }

    async fn fetch_post_interactions(&self, post_ids: &[PostId]) -> Result<Vec<InteractionRecord>> {
        self.check()?;
        Ok(self
            .interactions
            .iter()
            .filter(|r| post_ids.contains(&r.post_id))
            .copied()
            .collect())
    }
}

fn feed_config(k: usize) -> FeedConfig {
    FeedConfig {
        latent_factors: k,
        ..FeedConfig::default()
    }
}

fn position(feed: &[PostId], post: PostId) -> usize {
    feed.iter().position(|&p| p == post).unwrap()
}

#[tokio::test]
async fn test_popular_and_friend_pools_without_interactions() {
    let store = Arc::new(FixedPoolStore::new(&[(1, 50), (2, 40), (3, 10)], &[(2, 40), (4, 5)]));

    let selector = CandidateSelector::new(store.clone(), 1000);
    let candidates = assert_ok!(selector.gather(7, 3).await);
    assert_eq!(candidates.ids(), vec![1, 2, 3]);

    let ranker = FeedRanker::new(store, feed_config(8));
    let feed = assert_ok!(ranker.build_feed(7, 3).await);
    assert_eq!(feed, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_correlated_taste_lifts_related_posts() {
    // post 3 leads the union, so only the factorization can move post 1 ahead of it
    let store = FixedPoolStore::new(&[(3, 50), (1, 40), (2, 10)], &[])
        .with_interactions(&[(7, 2, 1.0), (8, 1, 1.0), (8, 2, 1.0)]);
    let ranker = FeedRanker::new(Arc::new(store), feed_config(1));

    let feed = assert_ok!(ranker.build_feed(7, 3).await);
    assert_eq!(feed, vec![2, 1, 3]);
    assert!(position(&feed, 1) < position(&feed, 3));
}

#[tokio::test]
async fn test_full_rank_working_set_reproduces_interactions() {
    // two users and three posts: the default k covers the whole matrix, so
    // untouched posts keep score 0 and fall back to union order
    let store = FixedPoolStore::new(&[(3, 50), (1, 40), (2, 10)], &[])
        .with_interactions(&[(7, 2, 1.0), (8, 1, 1.0), (8, 2, 1.0)]);
    let ranker = FeedRanker::new(Arc::new(store), FeedConfig::default());

    assert_eq!(assert_ok!(ranker.build_feed(7, 3).await), vec![2, 3, 1]);
}

#[tokio::test]
async fn test_boundaries() {
    let store = Arc::new(FixedPoolStore::new(&[(1, 50), (2, 40)], &[]));
    let ranker = FeedRanker::new(store, feed_config(8));
    assert!(assert_ok!(ranker.build_feed(7, 0).await).is_empty());

    let empty = Arc::new(FixedPoolStore::new(&[], &[]));
    let ranker = FeedRanker::new(empty, feed_config(8));
    assert!(assert_ok!(ranker.build_feed(7, 10).await).is_empty());

    let single = Arc::new(FixedPoolStore::new(&[], &[(42, 0)]));
    let ranker = FeedRanker::new(single, feed_config(8));
    assert_eq!(assert_ok!(ranker.build_feed(7, 10).await), vec![42]);
}

#[tokio::test]
async fn test_data_source_failure_propagates() {
    let store = Arc::new(FixedPoolStore::new(&[(1, 50)], &[]).failing());
    let ranker = FeedRanker::new(store, feed_config(8));

    let err = assert_err!(ranker.build_feed(7, 10).await);
    assert!(matches!(err, FeedError::DataSource(_)));
}

#[tokio::test]
async fn test_non_finite_strength_fails_the_feed() {
    let store = FixedPoolStore::new(&[(1, 50), (2, 40)], &[]).with_interactions(&[(7, 1, f32::NAN)]);
    let ranker = FeedRanker::new(Arc::new(store), feed_config(2));

    let err = assert_err!(ranker.build_feed(7, 2).await);
    assert!(matches!(err, FeedError::Ranking(_)));
}

#[tokio::test]
async fn test_large_weights_sum_past_f32_range() {
    let store = FixedPoolStore::new(&[(1, 50), (2, 40)], &[])
        .with_interactions(&[(7, 2, 3.0e38), (7, 2, 3.0e38), (8, 1, 1.0)]);
    let ranker = FeedRanker::new(Arc::new(store), feed_config(2));

    assert_eq!(assert_ok!(ranker.build_feed(7, 2).await), vec![2, 1]);
}

#[tokio::test]
async fn test_deterministic_across_calls_and_execution_modes() {
    let records = [
        (7, 2, 1.0),
        (7, 5, 0.5),
        (8, 1, 1.0),
        (8, 2, 1.0),
        (9, 3, 1.0),
        (9, 5, 1.0),
        (9, 4, 0.5),
    ];
    let pools = (&[(1, 50), (2, 40), (3, 10)], &[(4, 8), (5, 3)]);

    let offloaded = FeedRanker::new(
        Arc::new(FixedPoolStore::new(pools.0, pools.1).with_interactions(&records)),
        FeedConfig {
            offload_factorization: true,
            ..feed_config(2)
        },
    );
    let inline = FeedRanker::new(
        Arc::new(FixedPoolStore::new(pools.0, pools.1).with_interactions(&records)),
        FeedConfig {
            offload_factorization: false,
            ..feed_config(2)
        },
    );

    let first = assert_ok!(offloaded.build_feed(7, 5).await);
    let second = assert_ok!(offloaded.build_feed(7, 5).await);
    let third = assert_ok!(inline.build_feed(7, 5).await);
    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[tokio::test]
async fn test_cache_does_not_change_ranking() {
    let snapshot: StoreSnapshot =
        serde_json::from_str(include_str!("../fixtures/sample_snapshot.json")).unwrap();

    let plain = FeedRanker::new(
        Arc::new(InMemoryInteractionStore::from_snapshot(snapshot.clone()).unwrap()),
        feed_config(1),
    );
    let cached = FeedRanker::new(
        Arc::new(InMemoryInteractionStore::from_snapshot(snapshot).unwrap()),
        feed_config(1),
    )
    .with_cache(Arc::new(MemoryScoreCache::new(4)));

    let expected = assert_ok!(plain.build_feed(1, 10).await);
    assert_eq!(assert_ok!(cached.build_feed(1, 10).await), expected);
    assert_eq!(assert_ok!(cached.build_feed(1, 10).await), expected);

    // post 5 is authored by user 1 and must never be offered back
    assert!(!expected.contains(&5));
    assert_eq!(expected.len(), 5);
}

#[tokio::test]
async fn test_new_interactions_change_the_ranking() {
    let store = Arc::new(InMemoryInteractionStore::new());
    for (post, likes) in [(1, 30), (2, 20), (3, 10)] {
        store.add_post(post, 100, Some(likes));
    }
    let ranker = FeedRanker::new(store.clone(), feed_config(1))
        .with_cache(Arc::new(MemoryScoreCache::new(4)));

    assert_eq!(assert_ok!(ranker.build_feed(7, 3).await), vec![1, 2, 3]);

    store.record_interaction(InteractionRecord::new(7, 3, 1.0)).unwrap();
    store.record_interaction(InteractionRecord::new(8, 3, 1.0)).unwrap();
    store.record_interaction(InteractionRecord::new(8, 2, 1.0)).unwrap();

    assert_eq!(assert_ok!(ranker.build_feed(7, 3).await), vec![3, 2, 1]);
}

#[tokio::test]
async fn test_feed_is_drawn_from_candidates() {
    let mut rng = StdRng::seed_from_u64(17);

    for _ in 0..25 {
        let popular: Vec<(PostId, i64)> = (0..rng.gen_range(0..12))
            .map(|_| (rng.gen_range(0..30), rng.gen_range(0..100)))
            .collect();
        let followed: Vec<(PostId, i64)> = (0..rng.gen_range(0..12))
            .map(|_| (rng.gen_range(0..30), rng.gen_range(0..100)))
            .collect();
        let records: Vec<(UserId, PostId, f32)> = (0..rng.gen_range(0..40))
            .map(|_| (rng.gen_range(0..6), rng.gen_range(0..30), rng.gen_range(0.0..2.0)))
            .collect();
        let limit = rng.gen_range(0..15);
        let k = rng.gen_range(1..5);

        let candidates: HashSet<PostId> = CandidateSelector::select(
            0,
            &popular.iter().map(|&p| p.into()).collect::<Vec<_>>(),
            &followed.iter().map(|&p| p.into()).collect::<Vec<_>>(),
            limit,
        )
        .ids()
        .into_iter()
        .collect();

        let store = FixedPoolStore::new(&popular, &followed).with_interactions(&records);
        let ranker = FeedRanker::new(Arc::new(store), feed_config(k));
        let feed = assert_ok!(ranker.build_feed(0, limit).await);

        let unique: HashSet<PostId> = feed.iter().copied().collect();
        assert_eq!(unique.len(), feed.len());
        assert_eq!(unique, candidates);
        assert!(feed.len() <= limit);
    }
}
