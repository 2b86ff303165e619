//! Notification dispatch.
//!
//! Notifications are strictly fire-and-forget: they are dispatched on a
//! detached task after the database commit, outside the pool lock, and
//! every delivery error is swallowed.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// A trader-facing notification event.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Payment received; transaction funded and pooled.
    Funded { phone: String, reference: String },
    /// Transaction matched with a counterparty.
    Matched {
        phone: String,
        reference: String,
        amount: Decimal,
        currency: String,
    },
    /// Payment held below the acceptance threshold.
    PaymentHeld {
        phone: String,
        reference: String,
        expected: Decimal,
        paid: Decimal,
    },
    /// Transaction expired (unfunded or pool timeout).
    Expired { phone: String, reference: String },
}

/// Delivery boundary for notifications.
///
/// The transport (SMS, chat) is an external collaborator; implementors
/// only need to accept the event.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one notification.
    async fn dispatch(&self, notification: Notification) -> Result<(), String>;
}

/// Fire a notification on a detached task, swallowing any error.
pub fn dispatch_detached(dispatcher: Arc<dyn NotificationDispatcher>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = dispatcher.dispatch(notification).await {
            warn!(error = %e, "Notification delivery failed");
        }
    });
}

/// Dispatcher that only logs; the default in development.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), String> {
        info!(?notification, "Notification dispatched");
        Ok(())
    }
}

/// Dispatcher that records events for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications dispatched so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<(), String> {
        self.sent.lock().push(notification);
        Ok(())
    }
}
