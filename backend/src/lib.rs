//! Multi-location inventory accounting core
//!
//! Stock records per (product, location, batch), an append-only transaction
//! log, reorder alerting and read-only analytics, behind a pluggable store.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};

use config::InventoryConfig;
use services::{
    AnalyticsService, BroadcastPublisher, EventPublisher, InventoryService, NotificationSink,
    ReorderAlertEngine, TracingNotifier, TtlCache,
};
use store::InventoryStore;

/// Services wired over one store, shared by every caller
#[derive(Clone)]
pub struct AppState {
    pub inventory: InventoryService,
    pub alerts: Arc<ReorderAlertEngine>,
    pub analytics: AnalyticsService,
    pub events: BroadcastPublisher,
}

impl AppState {
    /// Default wiring: TTL cache, log notifier and broadcast events
    pub fn new(store: Arc<dyn InventoryStore>, config: &InventoryConfig) -> Self {
        let events = BroadcastPublisher::new(config.broadcast_capacity);
        Self::with_sinks(
            store,
            config,
            Arc::new(TracingNotifier),
            Arc::new(events.clone()),
            events,
        )
    }

    /// Wiring with caller-provided notification and event sinks
    pub fn with_sinks(
        store: Arc<dyn InventoryStore>,
        config: &InventoryConfig,
        notifier: Arc<dyn NotificationSink>,
        publisher: Arc<dyn EventPublisher>,
        events: BroadcastPublisher,
    ) -> Self {
        let cache = Arc::new(TtlCache::new(config.cache_ttl()));
        let inventory = InventoryService::new(
            store.clone(),
            cache,
            publisher.clone(),
            config.overdraw_policy,
        );
        let alerts = Arc::new(ReorderAlertEngine::new(
            store.clone(),
            notifier,
            publisher,
            config,
        ));
        let analytics = AnalyticsService::new(store);

        Self {
            inventory,
            alerts,
            analytics,
            events,
        }
    }
}
