use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Nothing to rank. Callers recover from this with an empty feed.
    #[error("Model input error: {0}")]
    ModelInput(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Ranking error: {0}")]
    Ranking(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<sqlx::Error> for FeedError {
    fn from(err: sqlx::Error) -> Self {
        FeedError::DataSource(err.to_string())
    }
}

impl From<redis::RedisError> for FeedError {
    fn from(err: redis::RedisError) -> Self {
        FeedError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Cache(err.to_string())
    }
}

impl From<tokio::task::JoinError> for FeedError {
    fn from(err: tokio::task::JoinError) -> Self {
        FeedError::Ranking(format!("factorization task failed: {}", err))
    }
}
