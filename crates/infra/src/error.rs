use thiserror::Error;

/// A concrete collaborator could not be built.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid connection url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("redis: {0}")]
    Redis(String),

    #[error("postgres: {0}")]
    Postgres(String),

    #[error("http client: {0}")]
    Http(String),

    #[error("{backend} support requires the `{feature}` feature")]
    FeatureDisabled {
        backend: &'static str,
        feature: &'static str,
    },
}
