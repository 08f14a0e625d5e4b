use std::path::PathBuf;

use thiserror::Error;

use crate::net::FetchError;
use crate::worker::WorkerState;

/// Failures of the cache storage backends.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(String),

    #[error("Failed to access cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors surfaced by worker event handlers.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to precache {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("Invalid locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Cannot {action} while worker is {state}")]
    InvalidState { action: &'static str, state: WorkerState },

    #[error("Failed to encode reply: {0}")]
    Reply(#[from] serde_json::Error),

    #[error("Message {0} requires a reply port")]
    MissingReplyPort(&'static str),

    #[error("Host is no longer listening")]
    HostClosed,

    #[error("Background sync failed: {0}")]
    Sync(String),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
