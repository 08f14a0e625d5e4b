//! The offline cache worker.
//!
//! Handlers live in submodules as free async functions over a
//! `WorkerContext`. `ServiceWorker` adds the lifecycle state machine on
//! top and can be driven either by direct calls or by feeding `HostEvent`s
//! into `run`.

pub mod context;
pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod push;
pub mod sync;

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

pub use context::WorkerContext;
pub use message::{ReplyPort, VersionReply};
pub use push::{ClickRoute, Notification};
pub use sync::{NoPendingData, PendingDataSource, RefreshReport, SyncOutcome};

use crate::error::{WorkerError, WorkerResult};
use crate::net::{Request, Response};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, install not yet run
    Parsed,
    Installing,
    /// Installed, waiting to activate
    Installed,
    Activating,
    /// Active and intercepting fetches
    Activated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
        }
    }
}

pub struct FetchEvent {
    pub request: Request,
    pub respond_with: oneshot::Sender<Option<Response>>,
}

pub struct MessageEvent {
    pub data: Option<Value>,
    pub ports: Vec<ReplyPort>,
}

pub struct NotificationClickEvent {
    pub notification: Notification,
    pub action: Option<String>,
}

/// Everything the host can deliver to the worker.
pub enum HostEvent {
    Install,
    Activate,
    Fetch(FetchEvent),
    Message(MessageEvent),
    Push { data: Option<Vec<u8>> },
    NotificationClick(NotificationClickEvent),
    Sync { tag: String },
    PeriodicSync { tag: String },
}

impl HostEvent {
    fn name(&self) -> &'static str {
        match self {
            HostEvent::Install => "install",
            HostEvent::Activate => "activate",
            HostEvent::Fetch(_) => "fetch",
            HostEvent::Message(_) => "message",
            HostEvent::Push { .. } => "push",
            HostEvent::NotificationClick(_) => "notificationclick",
            HostEvent::Sync { .. } => "sync",
            HostEvent::PeriodicSync { .. } => "periodicsync",
        }
    }
}

pub struct ServiceWorker {
    ctx: WorkerContext,
    state: Mutex<WorkerState>,
}

impl ServiceWorker {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx,
            state: Mutex::new(WorkerState::Parsed),
        }
    }

    /// Resume a version installed by an earlier process: if its cache
    /// already exists the worker starts out activated.
    pub async fn restore(ctx: WorkerContext) -> WorkerResult<Self> {
        let installed = ctx.caches.has(&ctx.config.cache_name()).await?;
        let worker = Self::new(ctx);
        if installed {
            worker.set_state(WorkerState::Activated);
        }
        Ok(worker)
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        debug!(state = %state, "Worker state changed");
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn transition(
        &self,
        action: &'static str,
        from: WorkerState,
        to: WorkerState,
    ) -> WorkerResult<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != from {
            return Err(WorkerError::InvalidState {
                action,
                state: *state,
            });
        }
        *state = to;
        Ok(())
    }

    /// Precache the manifest. A failed precache is reported but the worker
    /// still ends up installed.
    pub async fn install(&self) -> WorkerResult<usize> {
        self.transition("install", WorkerState::Parsed, WorkerState::Installing)?;
        let result = lifecycle::install(&self.ctx).await;
        self.set_state(WorkerState::Installed);
        result
    }

    pub async fn activate(&self) -> WorkerResult<Vec<String>> {
        self.transition("activate", WorkerState::Installed, WorkerState::Activating)?;
        let result = lifecycle::activate(&self.ctx).await;
        self.set_state(WorkerState::Activated);
        result
    }

    /// Intercept a page request. Until the worker is activated requests go
    /// straight to the network.
    pub async fn fetch(&self, request: Request) -> Option<Response> {
        if self.state() == WorkerState::Activated {
            fetch::handle_fetch(&self.ctx, request).await
        } else {
            match self.ctx.network.fetch(&request).await {
                Ok(response) => Some(response),
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Network request failed");
                    None
                }
            }
        }
    }

    pub async fn message(&self, data: Option<&Value>, ports: Vec<ReplyPort>) -> WorkerResult<()> {
        message::handle_message(&self.ctx, data, ports).await
    }

    pub async fn push(&self, data: Option<&[u8]>) -> WorkerResult<Option<Notification>> {
        push::handle_push(&self.ctx, data).await
    }

    pub async fn notification_click(
        &self,
        notification: &Notification,
        action: Option<&str>,
    ) -> WorkerResult<ClickRoute> {
        push::handle_notification_click(&self.ctx, notification, action).await
    }

    /// One-off background sync. Returns `None` for tags this worker does not
    /// handle.
    pub async fn sync(&self, tag: &str) -> Option<SyncOutcome> {
        if tag != self.ctx.config.sync_tag {
            debug!(tag = tag, "Ignoring sync with unknown tag");
            return None;
        }
        Some(sync::background_sync(&self.ctx).await)
    }

    /// Periodic refresh of every cached entry. Returns `None` for tags this
    /// worker does not handle.
    pub async fn periodic_sync(&self, tag: &str) -> Option<WorkerResult<RefreshReport>> {
        if tag != self.ctx.config.periodic_sync_tag {
            debug!(tag = tag, "Ignoring periodic sync with unknown tag");
            return None;
        }
        let result = sync::refresh_content(&self.ctx).await;
        if let Err(ref e) = result {
            error!(error = %e, "Content sync failed");
        }
        Some(result)
    }

    /// Wait for all background work (deferred cache writes, spawned event
    /// handlers) to finish.
    pub async fn settle(&self) {
        self.ctx.settle().await;
    }

    /// Handle a single event to completion.
    pub async fn dispatch(&self, event: HostEvent) -> WorkerResult<()> {
        match event {
            HostEvent::Install => self.install().await.map(|_| ()),
            HostEvent::Activate => self.activate().await.map(|_| ()),
            HostEvent::Fetch(FetchEvent {
                request,
                respond_with,
            }) => {
                let response = self.fetch(request).await;
                if respond_with.send(response).is_err() {
                    debug!("Fetch requester went away before the response was ready");
                }
                Ok(())
            }
            HostEvent::Message(MessageEvent { data, ports }) => {
                self.message(data.as_ref(), ports).await
            }
            HostEvent::Push { data } => self.push(data.as_deref()).await.map(|_| ()),
            HostEvent::NotificationClick(NotificationClickEvent {
                notification,
                action,
            }) => self
                .notification_click(&notification, action.as_deref())
                .await
                .map(|_| ()),
            HostEvent::Sync { tag } => {
                self.sync(&tag).await;
                Ok(())
            }
            HostEvent::PeriodicSync { tag } => match self.periodic_sync(&tag).await {
                Some(Err(e)) => Err(e),
                _ => Ok(()),
            },
        }
    }

    /// Consume events until the host closes the channel.
    ///
    /// Lifecycle events are handled in order, one at a time. Everything
    /// else runs in the background so fetches can interleave. Returns once
    /// the channel is closed and all background work has settled.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<HostEvent>) {
        info!(cache = %self.ctx.config.cache_name(), "Worker event loop started");
        while let Some(event) = events.recv().await {
            let name = event.name();
            match event {
                HostEvent::Install | HostEvent::Activate => {
                    if let Err(e) = self.dispatch(event).await {
                        error!(event = name, error = %e, "Lifecycle event failed");
                    }
                }
                other => {
                    let worker = Arc::clone(&self);
                    self.ctx.wait_until(async move {
                        if let Err(e) = worker.dispatch(other).await {
                            warn!(event = name, error = %e, "Event handler failed");
                        }
                    });
                }
            }
        }
        self.settle().await;
        info!("Worker event loop stopped");
    }
}
