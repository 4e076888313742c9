//! Shared fixtures for integration tests over the in-memory store

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use inventory_backend::{
    config::InventoryConfig,
    services::{BroadcastPublisher, EventPublisher, InventoryEvent, Notification, NotificationSink},
    store::{InventoryStore, MemoryStore, RecordFilter},
    AppError, AppResult, AppState,
};
use rust_decimal::Decimal;
use shared::{Actor, ActorRole, Location, LocationType, NewLocation, Product};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Keeps every notification it receives
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> AppResult<()> {
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

/// Transport that is always down
pub struct FailingNotifier;

#[async_trait]
impl NotificationSink for FailingNotifier {
    async fn notify(&self, _notification: Notification) -> AppResult<()> {
        Err(AppError::Internal("smtp unreachable".into()))
    }
}

pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _event: InventoryEvent) -> AppResult<()> {
        Err(AppError::Internal("socket closed".into()))
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub notifications: Arc<RecordingNotifier>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(InventoryConfig::default())
    }

    pub fn with_config(config: InventoryConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifications = Arc::new(RecordingNotifier::default());
        let events = BroadcastPublisher::new(config.broadcast_capacity);
        let state = AppState::with_sinks(
            store.clone(),
            &config,
            notifications.clone(),
            Arc::new(events.clone()),
            events,
        );
        Self {
            store,
            state,
            notifications,
        }
    }

    /// Services whose sinks always fail
    pub fn with_broken_sinks() -> Self {
        let config = InventoryConfig::default();
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_sinks(
            store.clone(),
            &config,
            Arc::new(FailingNotifier),
            Arc::new(FailingPublisher),
            BroadcastPublisher::new(1),
        );
        Self {
            store,
            state,
            notifications: Arc::new(RecordingNotifier::default()),
        }
    }

    pub async fn location(&self, code: &str) -> Location {
        self.state
            .inventory
            .create_location(NewLocation::new(
                format!("Site {}", code),
                code,
                LocationType::Warehouse,
            ))
            .await
            .unwrap()
    }

    pub async fn product(&self, name: &str, threshold: i64) -> Product {
        self.state
            .inventory
            .register_product(Product::new(name, threshold))
            .await
            .unwrap()
    }

    /// Sum of record quantities, the authoritative stock
    pub async fn record_total(&self, product_id: Uuid) -> i64 {
        self.store
            .find_records(&RecordFilter::product(product_id))
            .await
            .unwrap()
            .iter()
            .map(|r| r.quantity)
            .sum()
    }

    pub async fn quantity_at(&self, product_id: Uuid, location_id: Uuid) -> i64 {
        self.store
            .find_records(&RecordFilter::at(product_id, location_id))
            .await
            .unwrap()
            .iter()
            .map(|r| r.quantity)
            .sum()
    }

    pub async fn stored_product(&self, product_id: Uuid) -> Product {
        self.store.get_product(product_id).await.unwrap().unwrap()
    }

    pub async fn stored_location(&self, location_id: Uuid) -> Location {
        self.store.get_location(location_id).await.unwrap().unwrap()
    }
}

pub fn admin() -> Actor {
    Actor::new(Uuid::new_v4(), ActorRole::Admin)
}

pub fn dec(value: i64, scale: u32) -> Decimal {
    Decimal::new(value, scale)
}
