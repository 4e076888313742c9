//! Business logic services for multi-location inventory accounting

pub mod alerts;
pub mod analytics;
pub mod cache;
pub mod inventory;
pub mod notification;
pub mod sweeper;

pub use alerts::ReorderAlertEngine;
pub use analytics::AnalyticsService;
pub use cache::{CacheKey, CachedView, Generation, ReadCache, TtlCache};
pub use inventory::{
    InventoryService, NewBatch, StockUpdate, TrackSerialsOptions, TransferOptions,
    TransferResult, UpdateOptions,
};
pub use notification::{
    BroadcastPublisher, EventPublisher, InventoryEvent, Notification, NotificationSink,
    Severity, TracingNotifier,
};
pub use sweeper::AlertSweeper;
