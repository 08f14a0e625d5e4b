//! Commands the worker sends back to the host that runs it.
//!
//! In a browser these are `skipWaiting()`, `clients.claim()`,
//! `client.postMessage()`, `showNotification()` and `clients.openWindow()`.
//! Here they are a trait so the host can be a channel, a test recorder or
//! a real embedding.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::WorkerError;
use crate::worker::push::Notification;

/// Buffer size for the host command channel.
/// 32 covers a full precache + activation burst with headroom.
pub const CHANNEL_BUFFER_SIZE: usize = 32;

/// Structured message broadcast to every controlled client page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SyncStatus { message: String },
}

#[async_trait]
pub trait Host: Send + Sync {
    /// Activate this worker version without waiting for old clients to close.
    async fn skip_waiting(&self);

    /// Take control of every open client page immediately.
    async fn claim_clients(&self);

    /// Post a message to all controlled clients.
    async fn broadcast(&self, message: ClientMessage);

    async fn show_notification(&self, notification: Notification) -> Result<(), WorkerError>;

    async fn close_notification(&self, notification: &Notification);

    async fn open_window(&self, url: Url) -> Result<(), WorkerError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    SkipWaiting,
    ClaimClients,
    PostMessage(ClientMessage),
    ShowNotification(Notification),
    CloseNotification(Notification),
    OpenWindow(Url),
}

/// Host that forwards every command over an mpsc channel.
#[derive(Clone)]
pub struct ChannelHost {
    tx: mpsc::Sender<HostCommand>,
}

impl ChannelHost {
    pub fn new() -> (Self, mpsc::Receiver<HostCommand>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        (Self { tx }, rx)
    }

    async fn send(&self, command: HostCommand) -> Result<(), WorkerError> {
        self.tx.send(command).await.map_err(|e| {
            debug!(command = ?e.0, "Host channel closed, dropping command");
            WorkerError::HostClosed
        })
    }
}

#[async_trait]
impl Host for ChannelHost {
    async fn skip_waiting(&self) {
        let _ = self.send(HostCommand::SkipWaiting).await;
    }

    async fn claim_clients(&self) {
        let _ = self.send(HostCommand::ClaimClients).await;
    }

    async fn broadcast(&self, message: ClientMessage) {
        let _ = self.send(HostCommand::PostMessage(message)).await;
    }

    async fn show_notification(&self, notification: Notification) -> Result<(), WorkerError> {
        self.send(HostCommand::ShowNotification(notification)).await
    }

    async fn close_notification(&self, notification: &Notification) {
        let _ = self
            .send(HostCommand::CloseNotification(notification.clone()))
            .await;
    }

    async fn open_window(&self, url: Url) -> Result<(), WorkerError> {
        self.send(HostCommand::OpenWindow(url)).await
    }
}
