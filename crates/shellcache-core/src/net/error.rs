use thiserror::Error;

/// Failure to get any response at all. Non-2xx answers are responses,
/// not errors.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Offline: {0}")]
    Offline(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
