//! Periodic reorder sweep
//!
//! Runs `scan_and_trigger` off the request path on a fixed interval until the
//! shutdown signal flips. A failed sweep is logged and retried next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::alerts::ReorderAlertEngine;
use crate::error::AppResult;

pub struct AlertSweeper {
    engine: Arc<ReorderAlertEngine>,
    interval: Duration,
}

impl AlertSweeper {
    pub fn new(engine: Arc<ReorderAlertEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn the sweep loop; it exits once `shutdown` reads `true` or its sender drops
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_secs = self.interval.as_secs(), "Alert sweeper started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.run_once().await {
                            Ok(0) => debug!("Alert sweep found nothing new"),
                            Ok(created) => info!(created, "Alert sweep raised new alerts"),
                            Err(e) => warn!(error = %e, "Alert sweep failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Alert sweeper stopped");
        })
    }

    /// One sweep; returns the number of alerts created
    pub async fn run_once(&self) -> AppResult<usize> {
        Ok(self.engine.scan_and_trigger().await?.len())
    }
}
