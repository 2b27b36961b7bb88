//! Status broadcast hub.
//!
//! Every observer gets its own bounded queue. Publishing never blocks: a
//! slow observer loses messages while the others keep receiving them, and an
//! observer whose receiver is gone is detached on the next publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chat_link::ConnectionSnapshot;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::orchestrator::{ClipResult, Progress, Stage};
use crate::services::ConnectionReport;

/// Default per-observer queue capacity.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Connected,
    Status,
    ClipCreated,
    ConnectionTest,
    Error,
    Pong,
}

/// Message delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ClipResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ConnectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<ConnectionSnapshot>,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    fn new(kind: MessageType) -> Self {
        Self {
            kind,
            request_id: None,
            stage: None,
            progress: None,
            detail: None,
            code: None,
            result: None,
            report: None,
            chat: None,
            timestamp: Utc::now(),
        }
    }

    pub fn connected(observer_id: u64) -> Self {
        Self::new(MessageType::Connected).with_detail(format!("observer {observer_id}"))
    }

    /// Stage progress for a request.
    pub fn status(request_id: &str, stage: Stage, progress: Progress) -> Self {
        Self {
            request_id: Some(request_id.to_string()),
            stage: Some(stage),
            progress: Some(progress),
            ..Self::new(MessageType::Status)
        }
    }

    /// Terminal success for a request.
    pub fn clip_created(result: ClipResult) -> Self {
        Self {
            request_id: Some(result.request_id.clone()),
            stage: Some(Stage::Completed),
            progress: Some(Progress::Succeeded),
            detail: Some(result.clip_url.clone()),
            result: Some(result),
            ..Self::new(MessageType::ClipCreated)
        }
    }

    pub fn connection_test(report: ConnectionReport) -> Self {
        Self {
            report: Some(report),
            ..Self::new(MessageType::ConnectionTest)
        }
    }

    /// Chat connection change, republished for observers.
    pub fn chat_status(snapshot: ConnectionSnapshot) -> Self {
        Self {
            chat: Some(snapshot),
            ..Self::new(MessageType::Status)
        }
    }

    pub fn error(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(MessageType::Error)
            .with_code(code)
            .with_detail(detail)
    }

    pub fn pong() -> Self {
        Self::new(MessageType::Pong)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Fan-out of [`BroadcastMessage`]s to attached observers.
pub struct StatusHub {
    observers: RwLock<HashMap<u64, mpsc::Sender<BroadcastMessage>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl StatusHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        })
    }

    /// Register an observer. It is detached when the returned handle drops.
    pub fn attach(self: &Arc<Self>) -> Observer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.observers.write().insert(id, tx);
        debug!(observer_id = id, "Observer attached");

        Observer {
            id,
            receiver: rx,
            hub: Arc::downgrade(self),
        }
    }

    pub fn detach(&self, id: u64) {
        if self.observers.write().remove(&id).is_some() {
            debug!(observer_id = id, "Observer detached");
        }
    }

    /// Deliver `message` to every attached observer. Returns how many accepted it.
    pub fn publish(&self, message: BroadcastMessage) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let observers = self.observers.read();
            for (id, tx) in observers.iter() {
                match tx.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(observer_id = id, kind = ?message.kind, "Observer queue full, dropping message");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut observers = self.observers.write();
            for id in closed {
                observers.remove(&id);
                debug!(observer_id = id, "Removed closed observer");
            }
        }

        delivered
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: DEFAULT_OBSERVER_CAPACITY,
        }
    }
}

/// An attached observer's receiving end.
pub struct Observer {
    id: u64,
    receiver: mpsc::Receiver<BroadcastMessage>,
    hub: Weak<StatusHub>,
}

impl Observer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BroadcastMessage> {
        self.receiver.try_recv().ok()
    }

    /// Everything currently queued.
    pub fn drain(&mut self) -> Vec<BroadcastMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(self.id);
        }
    }
}
