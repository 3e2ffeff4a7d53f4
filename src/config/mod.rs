use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub feed: FeedConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Largest feed the HTTP and CLI surfaces request, and their default limit.
    pub candidate_limit: usize,
    /// Rows fetched from each candidate pool.
    pub retrieval_limit: usize,
    pub latent_factors: usize,
    /// Run the factorization on the blocking thread pool.
    pub offload_factorization: bool,
    pub like_weight: f32,
    pub play_weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    Recompute,
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub policy: CachePolicy,
    pub capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            candidate_limit: 1000,
            retrieval_limit: 1000,
            latent_factors: 8,
            offload_factorization: true,
            like_weight: 1.0,
            play_weight: 0.5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            postgres: PostgresConfig {
                url: "postgresql://localhost:5432/ygoons".to_string(),
                max_connections: 10,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                ttl_seconds: 300,
            },
            feed: FeedConfig::default(),
            cache: CacheConfig {
                policy: CachePolicy::Recompute,
                capacity: 256,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("FEEDRANK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
