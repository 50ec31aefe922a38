//! Reorder watch: a bus consumer that raises an alert when a part falls to its reorder point.

use std::collections::HashSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ledgergate_core::MovementId;
use ledgergate_events::Subscription;
use ledgergate_inventory::PartCode;

use crate::catalog::CatalogStore;
use crate::error::EngineResult;
use crate::ledger_store::LedgerEntry;
use crate::projector::BalanceProjector;

use super::WorkerHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderAlert {
    pub part_number: PartCode,
    pub available: i64,
    pub reorder_point: i64,
    pub movement_id: MovementId,
    pub sequence_number: u64,
    pub raised_at: DateTime<Utc>,
}

/// Alerts raised so far. Redelivered entries do not raise a second alert.
#[derive(Debug, Default)]
pub struct ReorderAlerts {
    inner: Mutex<AlertsInner>,
}

#[derive(Debug, Default)]
struct AlertsInner {
    seen: HashSet<u64>,
    alerts: Vec<ReorderAlert>,
}

impl ReorderAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false` when an alert for the same log position already exists.
    fn push(&self, alert: ReorderAlert) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        if !inner.seen.insert(alert.sequence_number) {
            return false;
        }
        inner.alerts.push(alert);
        true
    }

    pub fn all(&self) -> Vec<ReorderAlert> {
        self.inner.lock().map(|i| i.alerts.clone()).unwrap_or_default()
    }
}

pub struct ReorderWatch {
    catalog: Arc<CatalogStore>,
    projector: Arc<BalanceProjector>,
    alerts: Arc<ReorderAlerts>,
}

impl ReorderWatch {
    pub fn new(catalog: Arc<CatalogStore>, projector: Arc<BalanceProjector>, alerts: Arc<ReorderAlerts>) -> Self {
        Self {
            catalog,
            projector,
            alerts,
        }
    }

    /// Check the part an entry touched. Returns the alert if one was raised.
    pub fn handle(&self, entry: &LedgerEntry) -> EngineResult<Option<ReorderAlert>> {
        let movement = entry.payload();
        let part = self.catalog.part(&movement.part_number)?;
        let available = self.projector.query_available(&part.code)?.available;
        if !part.needs_reorder(available) {
            return Ok(None);
        }

        let alert = ReorderAlert {
            part_number: part.code.clone(),
            available,
            reorder_point: part.thresholds.reorder_point,
            movement_id: movement.id,
            sequence_number: entry.sequence_number(),
            raised_at: Utc::now(),
        };
        if !self.alerts.push(alert.clone()) {
            debug!(sequence = entry.sequence_number(), "reorder alert already raised");
            return Ok(None);
        }
        info!(
            part = %alert.part_number,
            available,
            reorder_point = alert.reorder_point,
            "part at or below reorder point"
        );
        Ok(Some(alert))
    }

    pub fn spawn(self, subscription: Subscription<LedgerEntry>) -> std::io::Result<WorkerHandle> {
        WorkerHandle::spawn("reorder-watch", move |shutdown_rx| self.run(subscription, shutdown_rx))
    }

    fn run(&self, subscription: Subscription<LedgerEntry>, shutdown_rx: mpsc::Receiver<()>) {
        let tick = Duration::from_millis(250);
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            match subscription.recv_timeout(tick) {
                Ok(entry) => {
                    if let Err(err) = self.handle(&entry) {
                        warn!(sequence = entry.sequence_number(), error = %err, "reorder check failed");
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("reorder watch stopped");
    }
}
