//! Network access for the worker.
//!
//! The worker never talks to reqwest directly; it goes through the `Fetch`
//! trait so that tests (and offline demos) can swap in a `ScriptedFetcher`.

pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod scripted;

use async_trait::async_trait;

pub use error::FetchError;
pub use http::HttpFetcher;
pub use request::{Destination, Request, RequestKey};
pub use response::{Response, ResponseType};
pub use scripted::ScriptedFetcher;

/// Issue a request and obtain a response or a failure.
///
/// Non-2xx statuses are responses, not errors; only transport failures
/// (offline, DNS, TLS, reset) come back as `Err`.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
