use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use ledgergate_core::MovementId;
use ledgergate_events::EventEnvelope;
use ledgergate_inventory::{Balance, BalanceChange, BalanceKey, Movement, PartCode};

use super::{CommitOutcome, LEDGER_STREAM, LedgerEntry, LedgerStore, LedgerStoreError};

#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    by_id: HashMap<MovementId, usize>,
    balances: BTreeMap<BalanceKey, Balance>,
}

impl LedgerState {
    fn current(&self, key: &BalanceKey) -> Balance {
        self.balances.get(key).cloned().unwrap_or_else(|| Balance::empty(key))
    }

    /// Every change must start from what is stored and end inside the invariants.
    fn check_changes(&self, changes: &[BalanceChange]) -> Result<(), LedgerStoreError> {
        for change in changes {
            let key = change.before.key();
            if change.after.key() != key {
                return Err(LedgerStoreError::InvalidCommit(format!(
                    "change rewrites {} into {}",
                    key,
                    change.after.key()
                )));
            }
            if self.current(&key) != change.before {
                return Err(LedgerStoreError::Concurrency(format!(
                    "balance {key} changed since it was read"
                )));
            }
            change
                .after
                .check_invariants()
                .map_err(|e| LedgerStoreError::InvalidCommit(e.to_string()))?;
        }
        Ok(())
    }
}

/// In-memory movement log and balance table.
///
/// Intended for tests/dev and the default binary. One lock covers log and balances, so an entry
/// and its balance effects become visible together.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn commit(
        &self,
        movement: Movement,
        changes: &[BalanceChange],
        recorded_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, LedgerStoreError> {
        let mut state = self.state.write().map_err(|_| LedgerStoreError::Poisoned)?;

        if let Some(&idx) = state.by_id.get(&movement.id) {
            return Ok(CommitOutcome::Duplicate(state.entries[idx].clone()));
        }

        let touched = movement.keys();
        let changed: Vec<BalanceKey> = changes.iter().map(|c| c.before.key()).collect();
        if touched != changed {
            return Err(LedgerStoreError::InvalidCommit(format!(
                "movement {} touches {} balance(s) but {} change(s) were supplied",
                movement.id,
                touched.len(),
                changed.len()
            )));
        }
        state.check_changes(changes)?;

        let sequence_number = state.entries.len() as u64 + 1;
        let id = movement.id;
        let entry = EventEnvelope::new(*id.as_uuid(), LEDGER_STREAM, sequence_number, recorded_at, movement);

        for change in changes {
            state.balances.insert(change.after.key(), change.after.clone());
        }
        let idx = state.entries.len();
        state.entries.push(entry.clone());
        state.by_id.insert(id, idx);

        Ok(CommitOutcome::Committed(entry))
    }

    fn apply_hold(&self, change: &BalanceChange) -> Result<Balance, LedgerStoreError> {
        let mut state = self.state.write().map_err(|_| LedgerStoreError::Poisoned)?;
        if change.before.quantity != change.after.quantity {
            return Err(LedgerStoreError::InvalidCommit(format!(
                "a hold cannot change the quantity of {}",
                change.before.key()
            )));
        }
        state.check_changes(std::slice::from_ref(change))?;
        state.balances.insert(change.after.key(), change.after.clone());
        Ok(change.after.clone())
    }

    fn entry(&self, id: MovementId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(state.by_id.get(&id).map(|&idx| state.entries[idx].clone()))
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(state.entries.clone())
    }

    fn entries_for_part(&self, part: &PartCode) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(state
            .entries
            .iter()
            .filter(|e| &e.payload().part_number == part)
            .cloned()
            .collect())
    }

    fn balance(&self, key: &BalanceKey) -> Result<Option<Balance>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(state.balances.get(key).cloned())
    }

    fn balances_for_part(&self, part: &PartCode) -> Result<Vec<Balance>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(state
            .balances
            .values()
            .filter(|b| &b.part_number == part)
            .cloned()
            .collect())
    }

    fn balances(&self) -> Result<Vec<Balance>, LedgerStoreError> {
        let state = self.state.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(state.balances.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use ledgergate_inventory::{LocationCode, project_movement};

    use super::*;

    fn pn() -> PartCode {
        PartCode::parse("PN-X").unwrap()
    }

    fn loc(s: &str) -> LocationCode {
        LocationCode::parse(s).unwrap()
    }

    fn commit(store: &InMemoryLedgerStore, m: Movement) -> Result<CommitOutcome, LedgerStoreError> {
        let changes = project_movement(&m, |k| store.balance(k).unwrap().unwrap_or_else(|| Balance::empty(k))).unwrap();
        store.commit(m, &changes, Utc::now())
    }

    #[test]
    fn sequence_numbers_are_monotonic_and_ids_unique() {
        let store = InMemoryLedgerStore::new();
        let first = Movement::entry(pn(), loc("A"), 5, "ana");
        let again = first.clone();
        let a = commit(&store, first).unwrap();
        let b = commit(&store, Movement::entry(pn(), loc("A"), 1, "ana")).unwrap();
        assert_eq!(a.entry().sequence_number(), 1);
        assert_eq!(b.entry().sequence_number(), 2);

        let dup = commit(&store, again).unwrap();
        assert!(matches!(dup, CommitOutcome::Duplicate(_)));
        assert_eq!(store.entries().unwrap().len(), 2);
        assert_eq!(store.balance(&BalanceKey::new(pn(), loc("A"))).unwrap().unwrap().quantity, 6);
    }

    #[test]
    fn stale_before_image_is_a_concurrency_error() {
        let store = InMemoryLedgerStore::new();
        let m = Movement::entry(pn(), loc("A"), 5, "ana");
        let stale = project_movement(&m, |k| Balance::empty(k)).unwrap();
        commit(&store, Movement::entry(pn(), loc("A"), 1, "ana")).unwrap();
        let err = store.commit(m, &stale, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerStoreError::Concurrency(_)));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn holds_may_not_touch_quantity() {
        let store = InMemoryLedgerStore::new();
        commit(&store, Movement::entry(pn(), loc("A"), 5, "ana")).unwrap();
        let before = store.balance(&BalanceKey::new(pn(), loc("A"))).unwrap().unwrap();
        let bad = BalanceChange {
            after: Balance {
                quantity: 4,
                ..before.clone()
            },
            before: before.clone(),
        };
        assert!(store.apply_hold(&bad).is_err());

        let ok = BalanceChange {
            after: before.with_hold(2).unwrap(),
            before,
        };
        assert_eq!(store.apply_hold(&ok).unwrap().available(), 3);
    }
}
