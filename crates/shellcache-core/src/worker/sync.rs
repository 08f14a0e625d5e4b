//! Background sync and periodic content refresh.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::WorkerContext;
use crate::error::WorkerResult;
use crate::host::ClientMessage;

pub const SYNC_SUCCESS_MESSAGE: &str = "Data synchronized successfully";
pub const SYNC_FAILURE_MESSAGE: &str = "Background sync failed. Please try again.";

/// Source of work queued while the app was offline.
#[async_trait]
pub trait PendingDataSource: Send + Sync {
    async fn pending(&self) -> WorkerResult<Vec<Value>>;

    async fn sync(&self, items: &[Value]) -> WorkerResult<()>;
}

/// The app has no offline write queue, so there is never anything pending.
pub struct NoPendingData;

#[async_trait]
impl PendingDataSource for NoPendingData {
    async fn pending(&self) -> WorkerResult<Vec<Value>> {
        Ok(Vec::new())
    }

    async fn sync(&self, items: &[Value]) -> WorkerResult<()> {
        debug!(count = items.len(), "Syncing data");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NothingPending,
    Synced(usize),
    Failed,
}

/// One attempt per trigger. The host's own sync scheduling is the only
/// retry mechanism.
pub async fn background_sync(ctx: &WorkerContext) -> SyncOutcome {
    match push_pending(ctx).await {
        Ok(0) => SyncOutcome::NothingPending,
        Ok(count) => {
            notify_clients(ctx, SYNC_SUCCESS_MESSAGE).await;
            SyncOutcome::Synced(count)
        }
        Err(e) => {
            error!(error = %e, "Background sync failed");
            notify_clients(ctx, SYNC_FAILURE_MESSAGE).await;
            SyncOutcome::Failed
        }
    }
}

async fn push_pending(ctx: &WorkerContext) -> WorkerResult<usize> {
    let items = ctx.pending.pending().await?;
    if !items.is_empty() {
        ctx.pending.sync(&items).await?;
    }
    Ok(items.len())
}

async fn notify_clients(ctx: &WorkerContext, message: &str) {
    ctx.host
        .broadcast(ClientMessage::SyncStatus {
            message: message.to_string(),
        })
        .await;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Entries overwritten with a fresh 2xx response.
    pub refreshed: usize,
    /// Entries kept because the server answered non-2xx.
    pub kept: usize,
    /// Entries whose fetch or write failed.
    pub failed: usize,
}

/// Re-fetch every key of the current cache, one at a time. A failure on
/// one key is logged and does not stop the others.
pub async fn refresh_content(ctx: &WorkerContext) -> WorkerResult<RefreshReport> {
    let cache = ctx.current_cache();
    let keys = cache.keys().await?;
    let mut report = RefreshReport::default();

    for key in keys {
        let request = match key.to_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(key = %key, error = %e, "Unusable cache key");
                report.failed += 1;
                continue;
            }
        };

        match ctx.network.fetch(&request).await {
            Ok(response) if response.ok() => match cache.put(&request, response).await {
                Ok(()) => report.refreshed += 1,
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Failed to update cached resource");
                    report.failed += 1;
                }
            },
            Ok(response) => {
                debug!(url = %request.url, status = response.status, "Keeping cached copy");
                report.kept += 1;
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Failed to update cached resource");
                report.failed += 1;
            }
        }
    }

    info!(
        refreshed = report.refreshed,
        kept = report.kept,
        failed = report.failed,
        "Content sync finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::config::WorkerConfig;
    use crate::error::WorkerError;
    use crate::host::{ChannelHost, HostCommand};
    use crate::net::{Request, Response, ScriptedFetcher};

    struct Queue {
        items: Vec<Value>,
        fail: bool,
    }

    #[async_trait]
    impl PendingDataSource for Queue {
        async fn pending(&self) -> WorkerResult<Vec<Value>> {
            Ok(self.items.clone())
        }

        async fn sync(&self, _items: &[Value]) -> WorkerResult<()> {
            if self.fail {
                Err(WorkerError::Sync("server rejected batch".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn setup() -> (WorkerContext, Arc<ScriptedFetcher>, mpsc::Receiver<HostCommand>) {
        let config = WorkerConfig {
            scope: "https://water.test/".to_string(),
            ..Default::default()
        };
        let net = Arc::new(ScriptedFetcher::new(config.scope_url().unwrap()));
        let (host, rx) = ChannelHost::new();
        let ctx = WorkerContext::new(
            config,
            Arc::new(MemoryCacheStorage::new()),
            net.clone(),
            Arc::new(host),
        );
        (ctx, net, rx)
    }

    fn status(message: &str) -> HostCommand {
        HostCommand::PostMessage(ClientMessage::SyncStatus {
            message: message.to_string(),
        })
    }

    #[tokio::test]
    async fn test_default_source_is_a_no_op() {
        let (ctx, _net, mut rx) = setup();
        assert_eq!(background_sync(&ctx).await, SyncOutcome::NothingPending);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pending_items_are_synced_and_reported() {
        let (ctx, _net, mut rx) = setup();
        let ctx = ctx.with_pending_source(Arc::new(Queue {
            items: vec![serde_json::json!({"meter": 7, "reading": 1042})],
            fail: false,
        }));
        assert_eq!(background_sync(&ctx).await, SyncOutcome::Synced(1));
        assert_eq!(rx.recv().await, Some(status(SYNC_SUCCESS_MESSAGE)));
    }

    #[tokio::test]
    async fn test_failure_sends_one_message() {
        let (ctx, _net, mut rx) = setup();
        let ctx = ctx.with_pending_source(Arc::new(Queue {
            items: vec![Value::Null],
            fail: true,
        }));
        assert_eq!(background_sync(&ctx).await, SyncOutcome::Failed);
        assert_eq!(rx.recv().await, Some(status(SYNC_FAILURE_MESSAGE)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_isolates_failures() {
        let (ctx, net, _rx) = setup();
        let cache = ctx.current_cache();
        let ok = ctx.config.resolve("/app/js/app.js").unwrap();
        let gone = ctx.config.resolve("/app/js/old.js").unwrap();
        let broken = ctx.config.resolve("/app/js/utils.js").unwrap();
        for url in [&ok, &gone, &broken] {
            cache
                .put(&Request::get(url.clone()), Response::new(url, 200, "stale"))
                .await
                .unwrap();
        }
        net.respond(&ok, 200, "fresh");
        net.respond(&gone, 410, "gone");
        net.fail(&broken, "connection reset");

        let report = refresh_content(&ctx).await.unwrap();
        assert_eq!(
            report,
            RefreshReport {
                refreshed: 1,
                kept: 1,
                failed: 1
            }
        );

        let body = |url: &reqwest::Url| {
            let cache = cache.clone();
            let request = Request::get(url.clone());
            async move { cache.match_request(&request).await.unwrap().unwrap().text() }
        };
        assert_eq!(body(&ok).await, "fresh");
        assert_eq!(body(&gone).await, "stale");
        assert_eq!(body(&broken).await, "stale");
    }
}
