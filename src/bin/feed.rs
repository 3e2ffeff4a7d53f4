use feedrank::services::feed::FeedRanker;
use feedrank::services::store::{InMemoryInteractionStore, StoreSnapshot};
use feedrank::utils::validation::normalize_limit;
use feedrank::{init_tracing, Config, FeedResponse};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// Builds a feed from a JSON snapshot of posts, follows and interactions.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    snapshot: String,

    #[arg(short, long)]
    user: i64,

    #[arg(long)]
    limit: Option<i64>,

    /// Overrides feed.latent_factors
    #[arg(short = 'k', long)]
    factors: Option<usize>,

    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    let mut feed_config = config.feed.clone();
    if let Some(k) = args.factors {
        feed_config.latent_factors = k;
    }

    let raw = std::fs::read_to_string(&args.snapshot)
        .with_context(|| format!("reading snapshot {}", args.snapshot))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&raw).context("parsing snapshot")?;
    info!(
        "Loaded snapshot: {} posts, {} follows, {} interactions",
        snapshot.posts.len(),
        snapshot.follows.len(),
        snapshot.interactions.len()
    );

    let store = Arc::new(InMemoryInteractionStore::from_snapshot(snapshot)?);
    let limit = args
        .limit
        .map(|l| normalize_limit(l, feed_config.candidate_limit))
        .unwrap_or(feed_config.candidate_limit);

    let ranker = FeedRanker::new(store, feed_config);
    let post_ids = ranker.build_feed(args.user, limit).await?;

    println!("{}", serde_json::to_string_pretty(&FeedResponse::new(args.user, post_ids))?);
    Ok(())
}
