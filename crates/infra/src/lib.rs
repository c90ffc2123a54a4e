//! Infrastructure layer: concrete legacy-store drivers and the target-system
//! HTTP client.

pub mod config;
pub mod connect;
pub mod error;
pub mod faktory_http;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod river_postgres;
pub mod target_http;

pub use config::SourceConfig;
pub use connect::{connect_source, redact};
pub use error::ConnectError;
pub use faktory_http::FaktoryHttpApi;
#[cfg(feature = "redis")]
pub use redis_store::RedisKeyValueStore;
pub use river_postgres::PostgresRiverStore;
pub use target_http::HttpTargetClient;
