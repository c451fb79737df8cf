//! In-process notification bus for transient user-facing notices.
//!
//! Any component may publish; the console subscribes once and renders. A
//! subscription ends when it is dropped.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use uuid::Uuid;

const CAPACITY: usize = 64;
const DEFAULT_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "ok",
            NotificationKind::Warning => "warn",
            NotificationKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    /// How long a renderer should keep it visible.
    pub duration: Duration,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            duration: DEFAULT_DURATION,
        }
    }
}

/// Cloneable publish handle.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    /// Publish a notice. With nobody subscribed it is dropped.
    pub fn publish(&self, notification: Notification) -> Uuid {
        let id = notification.id;
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification {} dropped: no subscriber", id);
        }
        id
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(Notification::new(NotificationKind::Info, message));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(Notification::new(NotificationKind::Success, message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.publish(Notification::new(NotificationKind::Warning, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(Notification::new(NotificationKind::Error, message));
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            stream: BroadcastStream::new(self.tx.subscribe()),
        }
    }
}

/// Receiving end. Lagging subscribers skip what they missed.
pub struct Subscription {
    stream: BroadcastStream<Notification>,
}

impl Subscription {
    /// Next notification, or `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.stream.next().await? {
                Ok(n) => return Some(n),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!("Notification subscriber lagged, skipped {}", skipped);
                }
            }
        }
    }
}
