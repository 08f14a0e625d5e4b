use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::CacheError;
use crate::net::{Request, RequestKey, Response};

/// Persistent store of named caches, each mapping request keys to
/// response snapshots. Writes are last-write-wins per key.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the named cache if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    async fn names(&self) -> Result<Vec<String>, CacheError>;

    /// Remove a whole cache. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError>;

    /// Insert or replace one entry, creating the cache if needed.
    async fn put(&self, name: &str, key: RequestKey, response: Response) -> Result<(), CacheError>;

    /// Insert or replace a batch of entries. Either every entry is
    /// written or none is.
    async fn put_all(
        &self,
        name: &str,
        entries: Vec<(RequestKey, Response)>,
    ) -> Result<(), CacheError>;

    async fn keys(&self, name: &str) -> Result<Vec<RequestKey>, CacheError>;
}

/// Validate a cache name for use as a storage identifier.
pub(crate) fn check_name(name: &str) -> Result<(), CacheError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidName(name.to_string()))
    }
}

/// An opened cache: a storage backend plus the cache name.
///
/// Matching follows the default options of the browser Cache API: exact
/// method + URL, query string significant, and only GET is ever stored.
#[derive(Clone)]
pub struct CacheHandle {
    storage: Arc<dyn CacheStorage>,
    name: String,
}

impl CacheHandle {
    pub async fn open(storage: Arc<dyn CacheStorage>, name: &str) -> Result<Self, CacheError> {
        storage.open(name).await?;
        Ok(Self {
            storage,
            name: name.to_string(),
        })
    }

    /// Handle on a cache that may not exist yet. Reads miss until the
    /// first write creates it.
    pub fn unopened(storage: Arc<dyn CacheStorage>, name: &str) -> Self {
        Self {
            storage,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        if !request.is_get() {
            return Ok(None);
        }
        self.storage.get(&self.name, &request.key()).await
    }

    pub async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        if !request.is_get() {
            return Err(CacheError::UnsupportedMethod(request.method.to_string()));
        }
        debug!(cache = %self.name, url = %request.url, status = response.status, "Storing cache entry");
        self.storage.put(&self.name, request.key(), response).await
    }

    pub async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), CacheError> {
        let mut keyed = Vec::with_capacity(entries.len());
        for (request, response) in entries {
            if !request.is_get() {
                return Err(CacheError::UnsupportedMethod(request.method.to_string()));
            }
            keyed.push((request.key(), response));
        }
        self.storage.put_all(&self.name, keyed).await
    }

    pub async fn keys(&self) -> Result<Vec<RequestKey>, CacheError> {
        self.storage.keys(&self.name).await
    }
}
