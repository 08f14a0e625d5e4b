//! shellcache - offline cache manager for a single-page app shell.
//!
//! The library is split into:
//! - `config`: the injected worker configuration (cache identifier, manifest)
//! - `cache`: named, versioned request/response stores (memory and disk)
//! - `net`: request/response types and the `Fetch` seam over reqwest
//! - `host`: commands the worker issues back to its host (clients, notifications)
//! - `worker`: the event handlers and the `ServiceWorker` that dispatches them

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod net;
pub mod worker;

pub use cache::{CacheHandle, CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::WorkerConfig;
pub use error::{CacheError, WorkerError};
pub use host::{ChannelHost, ClientMessage, Host, HostCommand};
pub use net::{
    Destination, Fetch, FetchError, HttpFetcher, Request, RequestKey, Response, ResponseType,
    ScriptedFetcher,
};
pub use worker::{HostEvent, ServiceWorker, WorkerContext, WorkerState};
