//! Balance projector: stock queries over the live balance table, plus replay of the log.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ledgergate_core::DomainError;
use ledgergate_events::{EventEnvelope, Projection, ProjectionRunner};
use ledgergate_inventory::{Balance, BalanceKey, LocationCode, Movement, PartCode};

use crate::catalog::CatalogStore;
use crate::error::EngineResult;
use crate::ledger::MovementLedger;
use crate::ledger_store::LEDGER_STREAM;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartAvailability {
    pub part_number: PartCode,
    pub quantity: i64,
    pub reserved: i64,
    pub available: i64,
    pub locations: Vec<Balance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockItem {
    pub part_number: PartCode,
    pub description: String,
    pub available: i64,
    pub reorder_point: i64,
    pub minimum: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityMismatch {
    pub key: BalanceKey,
    pub live: i64,
    pub replayed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub entries: u64,
    pub last_sequence: u64,
    pub mismatches: Vec<QuantityMismatch>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Quantities folded from movements alone. Holds are not movements and never appear here.
#[derive(Debug, Default)]
pub struct QuantityProjection {
    quantities: BTreeMap<BalanceKey, i64>,
}

impl QuantityProjection {
    pub fn quantity(&self, key: &BalanceKey) -> i64 {
        self.quantities.get(key).copied().unwrap_or(0)
    }
}

impl Projection for QuantityProjection {
    type Ev = Movement;

    fn apply(&mut self, envelope: &EventEnvelope<Movement>) {
        for (key, delta) in envelope.payload().deltas() {
            // Saturates; a corrupt log then shows up as a mismatch instead of a panic.
            let q = self.quantities.entry(key).or_insert(0);
            *q = q.saturating_add(delta);
        }
    }
}

pub struct BalanceProjector {
    ledger: Arc<MovementLedger>,
    catalog: Arc<CatalogStore>,
}

impl BalanceProjector {
    pub fn new(ledger: Arc<MovementLedger>, catalog: Arc<CatalogStore>) -> Self {
        Self { ledger, catalog }
    }

    pub fn query(&self, part: &PartCode, location: &LocationCode) -> EngineResult<Balance> {
        self.catalog.part(part)?;
        self.catalog.location(location)?;
        self.ledger
            .balance(&BalanceKey::new(part.clone(), location.clone()))
    }

    /// Stock of one part summed over every location.
    pub fn query_available(&self, part: &PartCode) -> EngineResult<PartAvailability> {
        self.catalog.part(part)?;
        let locations = self.ledger.balances_for_part(part)?;
        let total = |field: fn(&Balance) -> i64| {
            locations
                .iter()
                .try_fold(0i64, |acc, b| acc.checked_add(field(b)))
                .ok_or_else(|| DomainError::invariant(format!("stock of {part} overflows across locations")))
        };
        let quantity = total(|b: &Balance| b.quantity)?;
        let reserved = total(|b: &Balance| b.reserved)?;
        Ok(PartAvailability {
            part_number: part.clone(),
            quantity,
            reserved,
            available: quantity - reserved,
            locations,
        })
    }

    /// Active parts at or below their reorder point.
    pub fn low_stock(&self) -> EngineResult<Vec<LowStockItem>> {
        let mut out = Vec::new();
        for part in self.catalog.parts() {
            let available = self.query_available(&part.code)?.available;
            if part.needs_reorder(available) {
                out.push(LowStockItem {
                    part_number: part.code.clone(),
                    description: part.description.clone(),
                    available,
                    reorder_point: part.thresholds.reorder_point,
                    minimum: part.thresholds.minimum,
                });
            }
        }
        Ok(out)
    }

    /// Rebuild quantities from an empty state and compare with the live table.
    pub fn replay(&self) -> EngineResult<ReplayReport> {
        let entries = self.ledger.entries()?;
        let mut runner = ProjectionRunner::for_stream(LEDGER_STREAM, QuantityProjection::default());
        runner
            .run(entries.iter())
            .map_err(|e| DomainError::invariant(format!("ledger replay failed: {e}")))?;

        let live: BTreeMap<BalanceKey, i64> = self
            .ledger
            .balances()?
            .into_iter()
            .map(|b| (b.key(), b.quantity))
            .collect();
        let replayed = runner.projection();

        let keys: BTreeSet<&BalanceKey> = live.keys().chain(replayed.quantities.keys()).collect();
        let mismatches: Vec<QuantityMismatch> = keys
            .into_iter()
            .filter_map(|key| {
                let live_q = live.get(key).copied().unwrap_or(0);
                let replayed_q = replayed.quantity(key);
                (live_q != replayed_q).then(|| QuantityMismatch {
                    key: key.clone(),
                    live: live_q,
                    replayed: replayed_q,
                })
            })
            .collect();

        let report = ReplayReport {
            entries: entries.len() as u64,
            last_sequence: runner.cursor().map(|c| c.last_sequence_number()).unwrap_or(0),
            mismatches,
        };
        if report.is_consistent() {
            info!(entries = report.entries, "ledger replay matches live balances");
        } else {
            warn!(mismatches = report.mismatches.len(), "ledger replay diverges from live balances");
        }
        Ok(report)
    }
}
