//! Read-only inventory analytics: turnover, aging and valuation

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{InventoryRecord, InventoryStatus, TransactionLogEntry, TransactionType};
use crate::types::TimeWindow;

/// Per-product movement totals over a lookback window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurnoverEntry {
    pub product_id: Uuid,
    pub total_sold: i64,
    pub total_received: i64,
    pub total_transferred_out: i64,
    pub total_adjusted: i64,
    pub current_stock: i64,
    /// Units sold per unit currently held
    pub turnover_rate: Decimal,
    /// `None` when nothing sold in the window
    pub days_of_supply: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnoverReport {
    pub window_days: i64,
    pub generated_at: DateTime<Utc>,
    pub products: Vec<TurnoverEntry>,
}

/// Time-since-received classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgingBucket {
    #[serde(rename = "0-30")]
    UpTo30,
    #[serde(rename = "31-90")]
    UpTo90,
    #[serde(rename = "91-180")]
    UpTo180,
    #[serde(rename = "181-365")]
    UpTo365,
    #[serde(rename = "365+")]
    Over365,
}

impl AgingBucket {
    pub const ALL: [AgingBucket; 5] = [
        AgingBucket::UpTo30,
        AgingBucket::UpTo90,
        AgingBucket::UpTo180,
        AgingBucket::UpTo365,
        AgingBucket::Over365,
    ];

    pub fn for_days(days: i64) -> Self {
        match days {
            i64::MIN..=30 => AgingBucket::UpTo30,
            31..=90 => AgingBucket::UpTo90,
            91..=180 => AgingBucket::UpTo180,
            181..=365 => AgingBucket::UpTo365,
            _ => AgingBucket::Over365,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::UpTo30 => "0-30",
            AgingBucket::UpTo90 => "31-90",
            AgingBucket::UpTo180 => "91-180",
            AgingBucket::UpTo365 => "181-365",
            AgingBucket::Over365 => "365+",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgingBucketSummary {
    pub bucket: AgingBucket,
    pub total_quantity: i64,
    pub total_value: Decimal,
    pub product_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgingReport {
    pub generated_at: DateTime<Utc>,
    pub buckets: Vec<AgingBucketSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValuationSummary {
    pub total_value: Decimal,
    pub total_quantity: i64,
    pub record_count: usize,
    /// Quantity-weighted cost per unit
    pub average_cost: Decimal,
}

/// Sum of quantities per product across every record
pub fn stock_by_product(records: &[InventoryRecord]) -> HashMap<Uuid, i64> {
    let mut totals = HashMap::new();
    for record in records {
        *totals.entry(record.product_id).or_insert(0) += record.quantity;
    }
    totals
}

/// Aggregate the log by product over `window`
pub fn turnover(
    transactions: &[TransactionLogEntry],
    records: &[InventoryRecord],
    window: &TimeWindow,
) -> TurnoverReport {
    let window_days = (window.end - window.start).num_days().max(1);
    let stock = stock_by_product(records);

    let mut by_product: BTreeMap<Uuid, TurnoverEntry> = BTreeMap::new();
    for entry in transactions.iter().filter(|t| window.contains(t.created_at)) {
        let totals = by_product
            .entry(entry.product_id)
            .or_insert_with(|| TurnoverEntry {
                product_id: entry.product_id,
                total_sold: 0,
                total_received: 0,
                total_transferred_out: 0,
                total_adjusted: 0,
                current_stock: 0,
                turnover_rate: Decimal::ZERO,
                days_of_supply: None,
            });
        match entry.transaction_type {
            TransactionType::Sale => totals.total_sold += entry.quantity,
            TransactionType::Purchase => totals.total_received += entry.quantity,
            TransactionType::Transfer if entry.is_outbound() => {
                totals.total_transferred_out += entry.quantity
            }
            TransactionType::Adjustment => totals.total_adjusted += entry.quantity,
            _ => {}
        }
    }

    let products = by_product
        .into_values()
        .map(|mut totals| {
            let current = stock.get(&totals.product_id).copied().unwrap_or(0);
            totals.current_stock = current;
            totals.turnover_rate = if current > 0 {
                (Decimal::from(totals.total_sold) / Decimal::from(current)).round_dp(2)
            } else {
                Decimal::ZERO
            };
            totals.days_of_supply = if totals.total_sold > 0 {
                Some(
                    (Decimal::from(current) * Decimal::from(window_days)
                        / Decimal::from(totals.total_sold))
                    .round_dp(1),
                )
            } else {
                None
            };
            totals
        })
        .collect();

    TurnoverReport {
        window_days,
        generated_at: window.end,
        products,
    }
}

/// Bucket active, non-empty records by days since receipt
pub fn aging(records: &[InventoryRecord], now: DateTime<Utc>) -> AgingReport {
    let mut sums: BTreeMap<AgingBucket, (i64, Decimal, HashSet<Uuid>)> = BTreeMap::new();
    for record in records
        .iter()
        .filter(|r| r.quantity > 0 && r.status == InventoryStatus::Active)
    {
        let bucket = AgingBucket::for_days(record.days_in_stock(now));
        let sum = sums
            .entry(bucket)
            .or_insert_with(|| (0, Decimal::ZERO, HashSet::new()));
        sum.0 += record.quantity;
        sum.1 += record.value();
        sum.2.insert(record.product_id);
    }

    let buckets = AgingBucket::ALL
        .iter()
        .map(|bucket| match sums.remove(bucket) {
            Some((quantity, value, products)) => AgingBucketSummary {
                bucket: *bucket,
                total_quantity: quantity,
                total_value: value,
                product_count: products.len(),
            },
            None => AgingBucketSummary {
                bucket: *bucket,
                total_quantity: 0,
                total_value: Decimal::ZERO,
                product_count: 0,
            },
        })
        .collect();

    AgingReport {
        generated_at: now,
        buckets,
    }
}

/// Total stock value at cost
pub fn valuation(records: &[InventoryRecord]) -> ValuationSummary {
    let total_value: Decimal = records.iter().map(InventoryRecord::value).sum();
    let total_quantity: i64 = records.iter().map(|r| r.quantity).sum();
    let average_cost = if total_quantity > 0 {
        (total_value / Decimal::from(total_quantity)).round_dp(4)
    } else {
        Decimal::ZERO
    };

    ValuationSummary {
        total_value,
        total_quantity,
        record_count: records.len(),
        average_cost,
    }
}
