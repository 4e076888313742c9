//! Reorder alert engine
//!
//! Stock levels are always summed from inventory records; the denormalized
//! `Product.stock` is never consulted. The store refuses a second open alert
//! for the same (product, location), which keeps repeated scans idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use shared::{
    stock_by_product, Actor, AlertFilter, AlertStatus, Location, Product, ReorderAlert,
};
use uuid::Uuid;

use super::notification::{EventPublisher, InventoryEvent, Notification, NotificationSink, Severity};
use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, RecordFilter};

#[derive(Clone)]
pub struct ReorderAlertEngine {
    store: Arc<dyn InventoryStore>,
    notifier: Arc<dyn NotificationSink>,
    publisher: Arc<dyn EventPublisher>,
    default_suggested_quantity: i64,
    default_lead_time_days: i32,
}

impl ReorderAlertEngine {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        notifier: Arc<dyn NotificationSink>,
        publisher: Arc<dyn EventPublisher>,
        config: &InventoryConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            publisher,
            default_suggested_quantity: config.default_suggested_quantity,
            default_lead_time_days: config.default_lead_time_days,
        }
    }

    /// Raise platform-wide alerts for every tracked product at or below its threshold.
    ///
    /// Returns only the alerts created by this scan.
    pub async fn scan_and_trigger(&self) -> AppResult<Vec<ReorderAlert>> {
        let products = self.store.list_products().await?;
        let records = self.store.find_records(&RecordFilter::default()).await?;
        let totals = stock_by_product(&records);

        let mut created = Vec::new();
        for product in products.iter().filter(|p| p.is_reorder_candidate()) {
            let stock = totals.get(&product.id).copied().unwrap_or(0);
            if let Some(alert) = self.trigger_if_low(product, None, stock).await? {
                created.push(alert);
            }
        }

        tracing::info!(
            products = products.len(),
            created = created.len(),
            "Reorder scan completed"
        );
        Ok(created)
    }

    /// Same check per product held at one location, using that location's stock
    pub async fn scan_location(&self, location_id: Uuid) -> AppResult<Vec<ReorderAlert>> {
        let location = self
            .store
            .get_location(location_id)
            .await?
            .ok_or_else(|| AppError::not_found("Location"))?;
        let records = self
            .store
            .find_records(&RecordFilter::location(location_id))
            .await?;

        let mut at_location: HashMap<Uuid, i64> = HashMap::new();
        for record in &records {
            *at_location.entry(record.product_id).or_insert(0) += record.quantity;
        }

        let mut created = Vec::new();
        for (product_id, stock) in at_location {
            let product = match self.store.get_product(product_id).await? {
                Some(product) if product.is_reorder_candidate() => product,
                _ => continue,
            };
            if let Some(alert) = self.trigger_if_low(&product, Some(&location), stock).await? {
                created.push(alert);
            }
        }

        tracing::info!(
            location_id = %location_id,
            created = created.len(),
            "Location reorder scan completed"
        );
        Ok(created)
    }

    pub async fn acknowledge(
        &self,
        alert_id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> AppResult<ReorderAlert> {
        let alert = self
            .transition(alert_id, |alert| alert.acknowledge(actor.id, notes, Utc::now()))
            .await?;
        self.notify(
            Notification::new(
                "reorder_alert_acknowledged",
                Severity::Low,
                format!("Reorder alert for product {} acknowledged", alert.product_id),
            )
            .with_details(serde_json::json!({
                "alertId": alert.id,
                "productId": alert.product_id,
                "locationId": alert.location_id,
                "acknowledgedBy": actor.id,
            })),
        )
        .await;
        Ok(alert)
    }

    /// Close an alert from any non-terminal state
    pub async fn resolve(
        &self,
        alert_id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> AppResult<ReorderAlert> {
        let alert = self
            .transition(alert_id, |alert| alert.resolve(actor.id, notes, Utc::now()))
            .await?;
        self.notify(
            Notification::new(
                "reorder_alert_resolved",
                Severity::Low,
                format!("Reorder alert for product {} resolved", alert.product_id),
            )
            .with_details(serde_json::json!({
                "alertId": alert.id,
                "productId": alert.product_id,
                "locationId": alert.location_id,
                "resolvedBy": actor.id,
            })),
        )
        .await;
        Ok(alert)
    }

    pub async fn cancel(
        &self,
        alert_id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> AppResult<ReorderAlert> {
        self.transition(alert_id, |alert| alert.cancel(actor.id, notes, Utc::now()))
            .await
    }

    pub async fn get_alert(&self, alert_id: Uuid) -> AppResult<ReorderAlert> {
        self.store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| AppError::not_found("Reorder alert"))
    }

    pub async fn list_alerts(&self, filter: &AlertFilter) -> AppResult<Vec<ReorderAlert>> {
        self.store.list_alerts(filter).await
    }

    async fn trigger_if_low(
        &self,
        product: &Product,
        location: Option<&Location>,
        stock: i64,
    ) -> AppResult<Option<ReorderAlert>> {
        if stock > product.reorder_threshold {
            return Ok(None);
        }

        let candidate = ReorderAlert::triggered(
            product.id,
            location.map(|l| l.id),
            product.reorder_threshold,
            stock,
            product.suggested_quantity(self.default_suggested_quantity),
            product.lead_time(self.default_lead_time_days),
            product.supplier_id,
            Utc::now(),
        );
        let alert = match self.store.insert_alert_if_none_open(candidate).await? {
            Some(alert) => alert,
            None => return Ok(None),
        };

        tracing::info!(
            alert_id = %alert.id,
            product_id = %product.id,
            location_id = ?alert.location_id,
            stock,
            threshold = product.reorder_threshold,
            priority = alert.priority.as_str(),
            "Reorder alert triggered"
        );

        let scope = match location {
            Some(l) => format!(" at {}", l.code),
            None => String::new(),
        };
        self.notify(
            Notification::new(
                "reorder_alert",
                alert.priority.into(),
                format!(
                    "{} is low{}: {} left, threshold {}",
                    product.name, scope, stock, product.reorder_threshold
                ),
            )
            .with_details(serde_json::json!({
                "alertId": alert.id,
                "productId": product.id,
                "locationId": alert.location_id,
                "currentStock": stock,
                "threshold": product.reorder_threshold,
                "suggestedQuantity": alert.suggested_quantity,
                "leadTimeDays": alert.lead_time_days,
                "supplierId": alert.supplier_id,
            })),
        )
        .await;
        self.emit(&alert).await;

        Ok(Some(alert))
    }

    /// Load, mutate and conditionally persist an alert
    async fn transition<F>(&self, alert_id: Uuid, apply: F) -> AppResult<ReorderAlert>
    where
        F: FnOnce(&mut ReorderAlert) -> Result<(), shared::AlertTransitionError>,
    {
        let mut alert = self.get_alert(alert_id).await?;
        let expected: AlertStatus = alert.status;
        apply(&mut alert)?;

        if !self.store.update_alert(&alert, expected).await? {
            return Err(AppError::ConcurrencyConflict(format!(
                "alert {} changed while it was being updated",
                alert_id
            )));
        }

        tracing::info!(
            alert_id = %alert_id,
            from = expected.as_str(),
            to = alert.status.as_str(),
            "Reorder alert status changed"
        );
        self.emit(&alert).await;
        Ok(alert)
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!(error = %e, "Failed to deliver notification");
        }
    }

    async fn emit(&self, alert: &ReorderAlert) {
        let event = InventoryEvent::AlertChanged {
            alert_id: alert.id,
            product_id: alert.product_id,
            location_id: alert.location_id,
            status: alert.status,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!(error = %e, "Failed to publish alert event");
        }
    }
}
