//! Append-only movement log plus the balance table derived from it.
//!
//! The store commits an entry and every balance it changes in one step. It does not decide
//! whether a movement is allowed; the ledger does that under the per-key locks and hands the
//! store the exact before/after pairs. The store re-checks each `before` against what it holds
//! so a writer that bypassed the locks fails loudly instead of corrupting a balance.

pub mod in_memory;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use ledgergate_core::MovementId;
use ledgergate_events::{EventBus, EventEnvelope};
use ledgergate_inventory::{Balance, BalanceChange, BalanceKey, Movement, PartCode};

pub use in_memory::InMemoryLedgerStore;

/// Stream name of the movement log.
pub const LEDGER_STREAM: &str = "inventory.movement";

/// A committed movement with its position in the log.
pub type LedgerEntry = EventEnvelope<Movement>;

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(LedgerEntry),
    /// The movement id was already in the log; nothing changed.
    Duplicate(LedgerEntry),
}

impl CommitOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            CommitOutcome::Committed(e) | CommitOutcome::Duplicate(e) => e,
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// A balance changed between projection and commit.
    #[error("stale balance: {0}")]
    Concurrency(String),

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("store lock poisoned")]
    Poisoned,
}

pub trait LedgerStore: Send + Sync {
    /// Append `movement` and apply `changes` atomically.
    fn commit(
        &self,
        movement: Movement,
        changes: &[BalanceChange],
        recorded_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, LedgerStoreError>;

    /// Change a balance without a movement (reservation holds).
    fn apply_hold(&self, change: &BalanceChange) -> Result<Balance, LedgerStoreError>;

    fn entry(&self, id: MovementId) -> Result<Option<LedgerEntry>, LedgerStoreError>;

    /// Every entry in sequence order.
    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    fn entries_for_part(&self, part: &PartCode) -> Result<Vec<LedgerEntry>, LedgerStoreError>;

    fn balance(&self, key: &BalanceKey) -> Result<Option<Balance>, LedgerStoreError>;

    fn balances_for_part(&self, part: &PartCode) -> Result<Vec<Balance>, LedgerStoreError>;

    fn balances(&self) -> Result<Vec<Balance>, LedgerStoreError>;
}

/// Adapter that publishes committed entries to an `EventBus` after a successful commit.
///
/// Publish happens only after commit succeeds, and a failed publish never undoes the commit.
pub struct PublishingLedgerStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingLedgerStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> LedgerStore for PublishingLedgerStore<S, B>
where
    S: LedgerStore,
    B: EventBus<LedgerEntry>,
{
    fn commit(
        &self,
        movement: Movement,
        changes: &[BalanceChange],
        recorded_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, LedgerStoreError> {
        let outcome = self.store.commit(movement, changes, recorded_at)?;

        if let CommitOutcome::Committed(entry) = &outcome {
            if let Err(err) = self.bus.publish(entry.clone()) {
                warn!(
                    sequence = entry.sequence_number(),
                    error = ?err,
                    "ledger entry committed but not published"
                );
            }
        }

        Ok(outcome)
    }

    fn apply_hold(&self, change: &BalanceChange) -> Result<Balance, LedgerStoreError> {
        self.store.apply_hold(change)
    }

    fn entry(&self, id: MovementId) -> Result<Option<LedgerEntry>, LedgerStoreError> {
        self.store.entry(id)
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        self.store.entries()
    }

    fn entries_for_part(&self, part: &PartCode) -> Result<Vec<LedgerEntry>, LedgerStoreError> {
        self.store.entries_for_part(part)
    }

    fn balance(&self, key: &BalanceKey) -> Result<Option<Balance>, LedgerStoreError> {
        self.store.balance(key)
    }

    fn balances_for_part(&self, part: &PartCode) -> Result<Vec<Balance>, LedgerStoreError> {
        self.store.balances_for_part(part)
    }

    fn balances(&self) -> Result<Vec<Balance>, LedgerStoreError> {
        self.store.balances()
    }
}
