//! Control messages from client pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::WorkerContext;
use crate::error::{WorkerError, WorkerResult};

/// Reply channel handed over by the page alongside a message.
pub type ReplyPort = oneshot::Sender<Value>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum ControlMessage {
    SkipWaiting,
    GetVersion,
}

/// Answer to `{type: "GET_VERSION"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

/// Handle `SKIP_WAITING` and `GET_VERSION`; anything else is ignored.
pub async fn handle_message(
    ctx: &WorkerContext,
    data: Option<&Value>,
    mut ports: Vec<ReplyPort>,
) -> WorkerResult<()> {
    let Some(data) = data else {
        return Ok(());
    };
    let message = match ControlMessage::deserialize(data) {
        Ok(message) => message,
        Err(_) => {
            debug!(message = %data, "Ignoring unrecognized client message");
            return Ok(());
        }
    };

    match message {
        ControlMessage::SkipWaiting => ctx.host.skip_waiting().await,
        ControlMessage::GetVersion => {
            if ports.is_empty() {
                return Err(WorkerError::MissingReplyPort("GET_VERSION"));
            }
            let port = ports.swap_remove(0);
            let reply = serde_json::to_value(VersionReply {
                version: ctx.config.cache_name(),
            })?;
            if port.send(reply).is_err() {
                debug!("Reply port closed before version was sent");
            }
        }
    }
    Ok(())
}
