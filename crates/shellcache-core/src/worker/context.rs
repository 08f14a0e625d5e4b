use std::future::Future;
use std::sync::Arc;

use tokio_util::task::TaskTracker;

use super::sync::{NoPendingData, PendingDataSource};
use crate::cache::{CacheHandle, CacheStorage};
use crate::config::WorkerConfig;
use crate::host::Host;
use crate::net::Fetch;

/// Everything a handler needs, passed explicitly instead of read from
/// globals. Clone is cheap; all members are shared.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<WorkerConfig>,
    pub caches: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Fetch>,
    pub host: Arc<dyn Host>,
    pub pending: Arc<dyn PendingDataSource>,
    tasks: TaskTracker,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetch>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            caches,
            network,
            host,
            pending: Arc::new(NoPendingData),
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_pending_source(mut self, pending: Arc<dyn PendingDataSource>) -> Self {
        self.pending = pending;
        self
    }

    /// Handle on the cache named by the current identifier. Does not create
    /// it; lookups on a missing cache simply miss.
    pub fn current_cache(&self) -> CacheHandle {
        CacheHandle::unopened(self.caches.clone(), &self.config.cache_name())
    }

    /// Run `work` in the background while keeping the worker alive until it
    /// finishes (see `settle`).
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(work);
    }

    /// Wait for every piece of background work registered so far.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}
