//! Movement ledger: the only writer of movements and balances.
//!
//! ```text
//! append(movement, clearance)
//!   ├─ shape + clearance + catalog checks      (no locks)
//!   ├─ lock balance keys, ascending order
//!   ├─ project against current balances         (all-or-nothing)
//!   ├─ commit entry + balances                  (one store step, publishes after commit)
//!   └─ audit
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ledgergate_core::{DomainError, MovementId, ReservationId, TaskId};
use ledgergate_inventory::{Balance, BalanceChange, BalanceKey, Movement, PartCode, project_movement};

use crate::audit::{AuditRecord, AuditSink};
use crate::catalog::CatalogStore;
use crate::error::{EngineError, EngineResult};
use crate::ledger_store::{CommitOutcome, LedgerEntry, LedgerStore};
use crate::locks::{KeyGuard, KeyLocks};

/// Proof that a movement went through routing.
///
/// Only the confidence router and the reservation manager can mint one, so nothing outside this
/// crate can write to the ledger around the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clearance(ClearanceKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClearanceKind {
    Autonomous,
    Approved(TaskId),
    Fulfillment(ReservationId),
}

impl Clearance {
    pub(crate) fn autonomous() -> Self {
        Self(ClearanceKind::Autonomous)
    }

    pub(crate) fn approved(task: TaskId) -> Self {
        Self(ClearanceKind::Approved(task))
    }

    pub(crate) fn fulfillment(reservation: ReservationId) -> Self {
        Self(ClearanceKind::Fulfillment(reservation))
    }

    pub fn as_str(&self) -> &'static str {
        match self.0 {
            ClearanceKind::Autonomous => "autonomous",
            ClearanceKind::Approved(_) => "approved",
            ClearanceKind::Fulfillment(_) => "fulfillment",
        }
    }

    /// The movement must carry exactly the references its clearance vouches for.
    fn check(&self, movement: &Movement) -> EngineResult<()> {
        let ok = match self.0 {
            ClearanceKind::Autonomous => movement.hil_task.is_none() && movement.reservation.is_none(),
            ClearanceKind::Approved(task) => movement.hil_task == Some(task) && movement.reservation.is_none(),
            ClearanceKind::Fulfillment(r) => movement.reservation == Some(r) && movement.hil_task.is_none(),
        };
        if !ok {
            return Err(DomainError::validation(format!(
                "movement {} does not match its {} clearance",
                movement.id,
                self.as_str()
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub movement_id: MovementId,
    pub sequence_number: u64,
    /// The id was already in the log; nothing was applied this time.
    pub duplicate: bool,
    pub balances: Vec<Balance>,
}

pub struct MovementLedger {
    store: Arc<dyn LedgerStore>,
    catalog: Arc<CatalogStore>,
    audit: Arc<dyn AuditSink>,
    locks: KeyLocks,
}

impl MovementLedger {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: Arc<CatalogStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            catalog,
            audit,
            locks: KeyLocks::new(),
        }
    }

    /// Append a cleared movement.
    pub fn append(&self, movement: Movement, clearance: Clearance) -> EngineResult<AppendReceipt> {
        movement.validate_shape()?;
        clearance.check(&movement)?;

        if let Some(existing) = self.store.entry(movement.id)? {
            debug!(movement = %movement.id, "duplicate movement id, returning original entry");
            return self.receipt(&existing, true);
        }

        self.check_references(&movement)?;
        let guard = self.lock(movement.keys())?;
        self.append_locked(&guard, movement, clearance)
    }

    /// Append while the caller already holds every key the movement touches.
    pub(crate) fn append_locked(
        &self,
        guard: &KeyGuard<'_>,
        movement: Movement,
        clearance: Clearance,
    ) -> EngineResult<AppendReceipt> {
        movement.validate_shape()?;
        clearance.check(&movement)?;
        let keys = movement.keys();
        if let Some(missing) = keys.iter().find(|k| !guard.covers(k)) {
            return Err(DomainError::invariant(format!("append of {} without lock on {missing}", movement.id)).into());
        }
        self.check_references(&movement)?;

        let mut before = BTreeMap::new();
        for key in keys {
            let balance = self.balance(&key)?;
            before.insert(key, balance);
        }
        let changes = project_movement(&movement, |k| {
            before.get(k).cloned().unwrap_or_else(|| Balance::empty(k))
        })?;
        let (id, kind, actor) = (movement.id, movement.kind, movement.actor.clone());

        match self.store.commit(movement, &changes, Utc::now())? {
            CommitOutcome::Duplicate(existing) => {
                debug!(movement = %id, "duplicate movement id, returning original entry");
                self.receipt(&existing, true)
            }
            CommitOutcome::Committed(entry) => {
                self.audit.record(
                    AuditRecord::new(actor, "movement.appended", format!("movement:{id}"))
                        .with_before(&changes.iter().map(|c| &c.before).collect::<Vec<_>>())
                        .with_after(entry.payload()),
                );
                info!(
                    movement = %id,
                    kind = kind.as_str(),
                    sequence = entry.sequence_number(),
                    clearance = clearance.as_str(),
                    "movement appended"
                );
                Ok(AppendReceipt {
                    movement_id: id,
                    sequence_number: entry.sequence_number(),
                    duplicate: false,
                    balances: changes.into_iter().map(|c| c.after).collect(),
                })
            }
        }
    }

    /// Change a hold under the caller's lock. Quantity never moves here.
    pub(crate) fn apply_hold(&self, guard: &KeyGuard<'_>, change: BalanceChange) -> EngineResult<Balance> {
        let key = change.before.key();
        if !guard.covers(&key) {
            return Err(DomainError::invariant(format!("hold change on {key} without lock")).into());
        }
        Ok(self.store.apply_hold(&change)?)
    }

    pub(crate) fn lock(&self, keys: impl IntoIterator<Item = BalanceKey>) -> EngineResult<KeyGuard<'_>> {
        self.locks.acquire(keys)
    }

    /// Part and every location exist and are active.
    pub fn check_references(&self, movement: &Movement) -> EngineResult<()> {
        self.catalog.require_active_part(&movement.part_number)?;
        for loc in movement.from_location.iter().chain(movement.to_location.iter()) {
            self.catalog.require_active_location(loc)?;
        }
        Ok(())
    }

    fn receipt(&self, entry: &LedgerEntry, duplicate: bool) -> EngineResult<AppendReceipt> {
        let balances = entry
            .payload()
            .keys()
            .iter()
            .map(|k| self.balance(k))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(AppendReceipt {
            movement_id: entry.payload().id,
            sequence_number: entry.sequence_number(),
            duplicate,
            balances,
        })
    }

    /// Current balance; an untouched key reads as zero.
    pub fn balance(&self, key: &BalanceKey) -> EngineResult<Balance> {
        Ok(self.store.balance(key)?.unwrap_or_else(|| Balance::empty(key)))
    }

    pub fn balances_for_part(&self, part: &PartCode) -> EngineResult<Vec<Balance>> {
        Ok(self.store.balances_for_part(part)?)
    }

    pub fn balances(&self) -> EngineResult<Vec<Balance>> {
        Ok(self.store.balances()?)
    }

    pub fn entry(&self, id: MovementId) -> EngineResult<LedgerEntry> {
        self.store
            .entry(id)?
            .ok_or_else(|| EngineError::from(DomainError::not_found(format!("movement {id}"))))
    }

    pub fn entries(&self) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.store.entries()?)
    }

    pub fn entries_for_part(&self, part: &PartCode) -> EngineResult<Vec<LedgerEntry>> {
        Ok(self.store.entries_for_part(part)?)
    }
}

#[cfg(test)]
mod tests {
    use ledgergate_inventory::{LocationCode, LocationKind};

    use super::*;
    use crate::catalog::RegisterLocation;
    use crate::audit::{AuditQuery, AuditSink};
    use crate::ledger_store::{InMemoryLedgerStore, LedgerStoreError};
    use crate::testing::{Fixture, loc, pn};

    #[test]
    fn duplicate_id_is_a_noop() {
        let f = Fixture::new();
        let m = Movement::entry(pn(), loc("A"), 5, "ana");
        let first = f.ledger.append(m.clone(), Clearance::autonomous()).unwrap();
        let second = f.ledger.append(m, Clearance::autonomous()).unwrap();
        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.sequence_number, second.sequence_number);
        assert_eq!(f.ledger.entries().unwrap().len(), 1);
        assert_eq!(f.quantity("A"), 5);
    }

    #[test]
    fn unknown_location_is_rejected_before_any_write() {
        let f = Fixture::new();
        let m = Movement::entry(pn(), LocationCode::parse("NOWHERE").unwrap(), 5, "ana");
        let err = f.ledger.append(m, Clearance::autonomous()).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InvalidReference(_))));
        assert!(f.ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn failed_transfer_leaves_both_balances_untouched() {
        let f = Fixture::new();
        f.stock("A", 3);
        let m = Movement::transfer(pn(), loc("A"), loc("B"), 5, "ana");
        let err = f.ledger.append(m, Clearance::autonomous()).unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InsufficientBalance { .. })));
        assert_eq!((f.quantity("A"), f.quantity("B")), (3, 0));
        assert_eq!(f.ledger.entries().unwrap().len(), 1);
    }

    #[test]
    fn location_capacity_does_not_limit_entries() {
        let f = Fixture::new();
        f.catalog
            .register_location(
                RegisterLocation {
                    code: loc("BIN-1"),
                    name: "small bin".into(),
                    kind: LocationKind::Shelf,
                    parent: None,
                    capacity: Some(5),
                },
                "setup",
            )
            .unwrap();
        f.ledger
            .append(Movement::entry(pn(), loc("BIN-1"), 8, "ana"), Clearance::autonomous())
            .unwrap();
        assert_eq!(f.quantity("BIN-1"), 8);
    }

    #[test]
    fn clearance_must_match_the_movement() {
        let f = Fixture::new();
        let m = Movement::entry(pn(), loc("A"), 5, "ana").with_hil_task(TaskId::new());
        assert!(f.ledger.append(m.clone(), Clearance::autonomous()).is_err());
        assert!(f.ledger.append(m, Clearance::approved(TaskId::new())).is_err());
    }

    /// Balance reads fail; everything else goes to a working store.
    struct UnreadableBalances(InMemoryLedgerStore);

    impl LedgerStore for UnreadableBalances {
        fn commit(
            &self,
            movement: Movement,
            changes: &[BalanceChange],
            recorded_at: chrono::DateTime<Utc>,
        ) -> Result<CommitOutcome, LedgerStoreError> {
            self.0.commit(movement, changes, recorded_at)
        }

        fn apply_hold(&self, change: &BalanceChange) -> Result<Balance, LedgerStoreError> {
            self.0.apply_hold(change)
        }

        fn entry(&self, id: MovementId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
            self.0.entry(id)
        }

        fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
            self.0.entries()
        }

        fn entries_for_part(&self, part: &PartCode) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
            self.0.entries_for_part(part)
        }

        fn balance(&self, _key: &BalanceKey) -> Result<Option<Balance>, LedgerStoreError> {
            Err(LedgerStoreError::Poisoned)
        }

        fn balances_for_part(&self, part: &PartCode) -> Result<Vec<Balance>, LedgerStoreError> {
            self.0.balances_for_part(part)
        }

        fn balances(&self) -> Result<Vec<Balance>, LedgerStoreError> {
            self.0.balances()
        }
    }

    #[test]
    fn balance_read_failure_is_reported_as_is() {
        let f = Fixture::new();
        let ledger = MovementLedger::new(
            Arc::new(UnreadableBalances(InMemoryLedgerStore::new())),
            f.catalog.clone(),
            f.audit.clone(),
        );

        let err = ledger
            .append(Movement::entry(pn(), loc("A"), 5, "ana"), Clearance::autonomous())
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(LedgerStoreError::Poisoned)), "{err}");
        assert!(ledger.entries().unwrap().is_empty());
    }

    #[test]
    fn appended_movements_are_audited() {
        let f = Fixture::new();
        f.stock("A", 2);
        let records = f.audit.query(&AuditQuery {
            action: Some("movement.appended".into()),
            ..AuditQuery::default()
        });
        assert_eq!(records.len(), 1);
    }
}
