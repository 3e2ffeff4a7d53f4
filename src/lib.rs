pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{FeedError, Result};
pub use models::*;

use services::feed::FeedRanker;
use services::store::PgInteractionStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<PgInteractionStore>,
    pub feed_ranker: Arc<FeedRanker>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store = Arc::new(
            PgInteractionStore::connect(&config.postgres, &config.feed).await?
        );

        let mut feed_ranker = FeedRanker::new(store.clone(), config.feed.clone());
        if let Some(cache) = services::cache::from_config(&config.cache, &config.redis)? {
            feed_ranker = feed_ranker.with_cache(cache);
        }

        Ok(Self {
            config,
            store,
            feed_ranker: Arc::new(feed_ranker),
        })
    }
}

pub async fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
