//! In-memory network with canned responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;

use super::{Fetch, FetchError, Request, RequestKey, Response, ResponseType};

enum Route {
    Respond(Response),
    Fail(String),
}

/// A `Fetch` implementation that answers from a routing table.
///
/// Unknown URLs get a 404, like a real server would. Every request is
/// recorded so callers can assert whether the network was touched.
pub struct ScriptedFetcher {
    scope: Url,
    routes: Mutex<HashMap<String, Route>>,
    log: Mutex<Vec<RequestKey>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new(scope: Url) -> Self {
        Self {
            scope,
            routes: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    fn route_key(url: &Url) -> String {
        let mut url = url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    /// Serve `body` with `status` for `url`, classified against the scope.
    pub fn respond(&self, url: &Url, status: u16, body: impl Into<Bytes>) {
        let kind = ResponseType::classify(&self.scope, url);
        let response = Response::new(url, status, body).with_kind(kind);
        self.respond_with(url, response);
    }

    /// Serve an exact response for `url`.
    pub fn respond_with(&self, url: &Url, response: Response) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(Self::route_key(url), Route::Respond(response));
        }
    }

    /// Make requests for `url` fail at the transport level.
    pub fn fail(&self, url: &Url, reason: &str) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(Self::route_key(url), Route::Fail(reason.to_string()));
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of requests that reached the network.
    pub fn calls(&self) -> usize {
        self.log.lock().map(|log| log.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(request.key());
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Offline(format!("{} (offline)", request.url)));
        }

        let routes = self
            .routes
            .lock()
            .map_err(|_| FetchError::InvalidResponse("routing table poisoned".to_string()))?;
        match routes.get(&Self::route_key(&request.url)) {
            Some(Route::Respond(response)) => Ok(response.clone()),
            Some(Route::Fail(reason)) => Err(FetchError::Offline(reason.clone())),
            None => {
                let kind = ResponseType::classify(&self.scope, &request.url);
                Ok(Response::new(&request.url, 404, "Not Found").with_kind(kind))
            }
        }
    }
}
