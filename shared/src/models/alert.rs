//! Reorder alert models and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A flagged low-stock condition for a product, platform-wide or at one location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReorderAlert {
    pub id: Uuid,
    pub product_id: Uuid,
    /// `None` means the alert covers the cross-location total
    pub location_id: Option<Uuid>,
    pub threshold: i64,
    /// Stock at the moment the alert fired
    pub current_stock: i64,
    pub status: AlertStatus,
    pub priority: AlertPriority,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub suggested_quantity: i64,
    pub lead_time_days: i32,
    pub supplier_id: Option<Uuid>,
    pub alert_history: Vec<AlertHistoryEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Triggered,
    Acknowledged,
    Resolved,
    Cancelled,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Triggered => "triggered",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Cancelled => "cancelled",
        }
    }

    /// Open alerts block new alerts for the same scope
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::Pending | AlertStatus::Triggered)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        match next {
            AlertStatus::Acknowledged => self.is_open(),
            AlertStatus::Resolved => !self.is_terminal(),
            AlertStatus::Cancelled => self.is_open(),
            AlertStatus::Pending | AlertStatus::Triggered => false,
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AlertStatus::Pending),
            "triggered" => Ok(AlertStatus::Triggered),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            "cancelled" => Ok(AlertStatus::Cancelled),
            other => Err(crate::ParseEnumError::new("alert status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    /// High when stock is at or below half the threshold, medium otherwise
    pub fn for_stock(current_stock: i64, threshold: i64) -> Self {
        if current_stock.saturating_mul(2) <= threshold {
            AlertPriority::High
        } else {
            AlertPriority::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Medium => "medium",
            AlertPriority::High => "high",
            AlertPriority::Critical => "critical",
        }
    }
}

impl std::str::FromStr for AlertPriority {
    type Err = crate::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertPriority::Low),
            "medium" => Ok(AlertPriority::Medium),
            "high" => Ok(AlertPriority::High),
            "critical" => Ok(AlertPriority::Critical),
            other => Err(crate::ParseEnumError::new("alert priority", other)),
        }
    }
}

/// One status transition in an alert's history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryEntry {
    pub status: AlertStatus,
    pub actor: Uuid,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Rejected alert status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move alert from {from} to {to}")]
pub struct AlertTransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

impl ReorderAlert {
    /// A freshly triggered alert
    #[allow(clippy::too_many_arguments)]
    pub fn triggered(
        product_id: Uuid,
        location_id: Option<Uuid>,
        threshold: i64,
        current_stock: i64,
        suggested_quantity: i64,
        lead_time_days: i32,
        supplier_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            location_id,
            threshold,
            current_stock,
            status: AlertStatus::Triggered,
            priority: AlertPriority::for_stock(current_stock, threshold),
            triggered_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            suggested_quantity,
            lead_time_days,
            supplier_id,
            alert_history: vec![AlertHistoryEntry {
                status: AlertStatus::Triggered,
                actor: Uuid::nil(),
                notes: Some(format!("Stock {} at or below threshold {}", current_stock, threshold)),
                at: now,
            }],
        }
    }

    fn transition(
        &mut self,
        next: AlertStatus,
        actor: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AlertTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(AlertTransitionError {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        self.alert_history.push(AlertHistoryEntry {
            status: next,
            actor,
            notes,
            at: now,
        });
        Ok(())
    }

    pub fn acknowledge(
        &mut self,
        actor: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AlertTransitionError> {
        self.transition(AlertStatus::Acknowledged, actor, notes, now)?;
        self.acknowledged_at = Some(now);
        self.acknowledged_by = Some(actor);
        Ok(())
    }

    pub fn resolve(
        &mut self,
        actor: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AlertTransitionError> {
        self.transition(AlertStatus::Resolved, actor, notes, now)?;
        self.resolved_at = Some(now);
        self.resolved_by = Some(actor);
        Ok(())
    }

    pub fn cancel(
        &mut self,
        actor: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AlertTransitionError> {
        self.transition(AlertStatus::Cancelled, actor, notes, now)
    }
}

/// Filter for listing alerts; unset fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub product_id: Option<Uuid>,
    /// `Some(None)` selects platform-wide alerts only
    pub location_id: Option<Option<Uuid>>,
    pub priority: Option<AlertPriority>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &ReorderAlert) -> bool {
        self.status.map_or(true, |s| alert.status == s)
            && self.product_id.map_or(true, |p| alert.product_id == p)
            && self.location_id.map_or(true, |l| alert.location_id == l)
            && self.priority.map_or(true, |p| alert.priority == p)
    }
}
