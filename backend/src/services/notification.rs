//! Outbound sinks for alert notifications and live inventory updates
//!
//! Both sinks are best-effort: the services log a failed delivery and carry
//! on, so a broken transport never fails or rolls back a stock mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{AlertPriority, AlertStatus, TransactionType};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<AlertPriority> for Severity {
    fn from(priority: AlertPriority) -> Self {
        match priority {
            AlertPriority::Low => Severity::Low,
            AlertPriority::Medium => Severity::Medium,
            AlertPriority::High => Severity::High,
            AlertPriority::Critical => Severity::Critical,
        }
    }
}

/// Operator-facing notification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

impl Notification {
    pub fn new(alert_type: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            alert_type: alert_type.to_string(),
            severity,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Delivery channel for notifications (email, webhook, push, ...)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> AppResult<()>;
}

/// Default sink: writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, notification: Notification) -> AppResult<()> {
        match notification.severity {
            Severity::High | Severity::Critical => tracing::warn!(
                alert_type = %notification.alert_type,
                details = %notification.details,
                "{}",
                notification.message
            ),
            Severity::Low | Severity::Medium => tracing::info!(
                alert_type = %notification.alert_type,
                details = %notification.details,
                "{}",
                notification.message
            ),
        }
        Ok(())
    }
}

/// Live-update event for UI subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InventoryEvent {
    #[serde(rename_all = "camelCase")]
    InventoryChanged {
        product_id: Uuid,
        location_id: Uuid,
        old_quantity: i64,
        new_quantity: i64,
        transaction_type: TransactionType,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    AlertChanged {
        alert_id: Uuid,
        product_id: Uuid,
        location_id: Option<Uuid>,
        status: AlertStatus,
        timestamp: DateTime<Utc>,
    },
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: InventoryEvent) -> AppResult<()>;
}

/// Fan-out over a tokio broadcast channel
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<InventoryEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: InventoryEvent) -> AppResult<()> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|e| AppError::Internal(format!("broadcast failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed() -> InventoryEvent {
        InventoryEvent::InventoryChanged {
            product_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            old_quantity: 10,
            new_quantity: 6,
            transaction_type: TransactionType::Sale,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(4);
        assert!(publisher.publish(changed()).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let publisher = BroadcastPublisher::new(4);
        let mut rx = publisher.subscribe();
        let event = changed();
        publisher.publish(event.clone()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(changed()).unwrap();
        assert_eq!(json["event"], "inventory_changed");
        assert_eq!(json["transactionType"], "sale");
        assert_eq!(json["newQuantity"], 6);
    }

    #[test]
    fn test_severity_from_priority() {
        assert_eq!(Severity::from(AlertPriority::High), Severity::High);
        assert_eq!(Severity::from(AlertPriority::Medium), Severity::Medium);
    }
}
