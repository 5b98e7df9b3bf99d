use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key-value backend failed a write. Surfaced to callers — alert state
    /// must not silently vanish.
    #[error("store error: {0}")]
    Store(String),

    #[error("invalid alert payload: {0}")]
    InvalidAlert(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Non-2xx or structurally unusable upstream response. Recovered inside
    /// the venue adapters via synthetic fallback; never reaches derived
    /// computations.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
