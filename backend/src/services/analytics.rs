//! Read-only inventory analytics over the store

use std::sync::Arc;

use chrono::Utc;
use shared::{
    AgingReport, TimeWindow, TransactionFilter, TransactionStatus, TurnoverReport,
    ValuationSummary,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, RecordFilter};

#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn InventoryStore>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Turnover over the trailing `window_days`
    pub async fn turnover(&self, window_days: i64) -> AppResult<TurnoverReport> {
        if window_days <= 0 {
            return Err(AppError::validation("timeframe", "Window must be at least one day"));
        }
        let window = TimeWindow::trailing_days(Utc::now(), window_days);
        let filter = TransactionFilter {
            since: Some(window.start),
            until: Some(window.end),
            ..Default::default()
        };

        // Reversed movements no longer count
        let transactions: Vec<_> = self
            .store
            .list_transactions(&filter)
            .await?
            .into_iter()
            .filter(|t| t.status == TransactionStatus::Completed)
            .collect();
        let records = self.store.find_records(&RecordFilter::default()).await?;

        Ok(shared::turnover(&transactions, &records, &window))
    }

    pub async fn aging(&self) -> AppResult<AgingReport> {
        let records = self.store.find_records(&RecordFilter::default()).await?;
        Ok(shared::aging(&records, Utc::now()))
    }

    pub async fn valuation(&self) -> AppResult<ValuationSummary> {
        let records = self.store.find_records(&RecordFilter::default()).await?;
        Ok(shared::valuation(&records))
    }

    pub async fn location_valuation(&self, location_id: Uuid) -> AppResult<ValuationSummary> {
        let records = self
            .store
            .find_records(&RecordFilter::location(location_id))
            .await?;
        Ok(shared::valuation(&records))
    }
}
