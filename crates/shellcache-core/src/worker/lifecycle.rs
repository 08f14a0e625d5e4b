//! Install and activate handlers.

use futures::future::try_join_all;
use tracing::{error, info};

use super::WorkerContext;
use crate::cache::CacheHandle;
use crate::error::{WorkerError, WorkerResult};
use crate::net::Request;

/// Precache the manifest, then ask the host to activate immediately.
///
/// Population is all-or-nothing: every locator is fetched first and the
/// batch is only written once all of them answered 2xx. Skip-waiting is
/// requested even when precaching failed. Returns the number of entries
/// stored.
pub async fn install(ctx: &WorkerContext) -> WorkerResult<usize> {
    let result = precache(ctx).await;
    if let Err(ref e) = result {
        error!(error = %e, "Failed to cache resources");
    }
    ctx.host.skip_waiting().await;
    result
}

async fn precache(ctx: &WorkerContext) -> WorkerResult<usize> {
    let cache = CacheHandle::open(ctx.caches.clone(), &ctx.config.cache_name()).await?;
    info!(cache = cache.name(), "Opened cache");

    let requests = ctx
        .config
        .precache
        .iter()
        .map(|locator| ctx.config.resolve(locator).map(Request::get))
        .collect::<WorkerResult<Vec<_>>>()?;

    let fetches = requests.into_iter().map(|request| async move {
        let response = ctx
            .network
            .fetch(&request)
            .await
            .map_err(|e| WorkerError::Precache {
                url: request.url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.ok() {
            return Err(WorkerError::Precache {
                url: request.url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        Ok::<_, WorkerError>((request, response))
    });
    let entries = try_join_all(fetches).await?;

    let count = entries.len();
    cache.put_all(entries).await?;
    info!(cache = cache.name(), count = count, "Precached manifest");
    Ok(count)
}

/// Delete every cache except the current one, then claim open clients.
/// Returns the names that were removed.
pub async fn activate(ctx: &WorkerContext) -> WorkerResult<Vec<String>> {
    let result = evict_stale(ctx).await;
    if let Err(ref e) = result {
        error!(error = %e, "Failed to evict old caches");
    }
    ctx.host.claim_clients().await;
    result
}

async fn evict_stale(ctx: &WorkerContext) -> WorkerResult<Vec<String>> {
    let current = ctx.config.cache_name();
    let stale: Vec<String> = ctx
        .caches
        .names()
        .await?
        .into_iter()
        .filter(|name| *name != current)
        .collect();

    try_join_all(stale.iter().map(|name| async move {
        info!(cache = %name, "Deleting old cache");
        ctx.caches.delete(name).await
    }))
    .await?;

    Ok(stale)
}
