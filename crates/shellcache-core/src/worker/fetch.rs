//! Cache-first fetch interception.

use tracing::{debug, warn};

use super::WorkerContext;
use crate::cache::CacheHandle;
use crate::net::{Destination, Request, Response};

/// Answer a page request: current cache first, then the network.
///
/// A hit is returned as-is with no revalidation. On a miss, a 200 basic
/// response is copied into the cache in the background. If the network
/// fails, navigations get the offline fallback page and everything else
/// resolves with `None`.
pub async fn handle_fetch(ctx: &WorkerContext, request: Request) -> Option<Response> {
    let cache = ctx.current_cache();

    match cache.match_request(&request).await {
        Ok(Some(hit)) => {
            debug!(url = %request.url, "Serving from cache");
            return Some(hit);
        }
        Ok(None) => {}
        Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed, treating as miss"),
    }

    let fetched = ctx.network.fetch(&request).await;
    match fetched {
        Ok(response) => {
            if response.is_cacheable() && request.is_get() {
                let copy = response.clone();
                let cache = cache.clone();
                ctx.wait_until(async move {
                    if let Err(e) = cache.put(&request, copy).await {
                        warn!(url = %request.url, error = %e, "Failed to store response");
                    }
                });
            } else {
                debug!(
                    url = %request.url,
                    status = response.status,
                    kind = ?response.kind,
                    "Passing response through uncached"
                );
            }
            Some(response)
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "Network request failed");
            if request.destination == Destination::Document {
                offline_fallback(ctx, &cache).await
            } else {
                None
            }
        }
    }
}

async fn offline_fallback(ctx: &WorkerContext, cache: &CacheHandle) -> Option<Response> {
    let url = match ctx.config.resolve(&ctx.config.offline_fallback) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Offline fallback locator is invalid");
            return None;
        }
    };
    match cache.match_request(&Request::get(url)).await {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "Failed to read offline fallback page");
            None
        }
    }
}
