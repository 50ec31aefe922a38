//! Stock engine services: catalog, movement ledger, balances, reservations, the confidence
//! router with its approval tasks, and import negotiation.
//!
//! ```text
//!   import coordinator ──► confidence router ──► movement ledger ──► ledger store ──► bus
//!                               │                     ▲                                │
//!                               └─► hil tasks         │                                ▼
//!                                    (approve) ───────┘                          reorder watch
//!   reservation manager ── holds + fulfillment exits ──┘
//! ```
//!
//! Everything here is synchronous and runs over in-memory stores behind traits.

pub mod audit;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod imports;
pub mod ledger;
pub mod ledger_store;
pub mod locks;
pub mod projector;
pub mod reservations;
pub mod router;
pub mod store;
pub mod workers;

mod integration_tests;
#[cfg(test)]
mod testing;

pub use audit::{AuditQuery, AuditRecord, AuditSink, InMemoryAuditLog};
pub use catalog::{CatalogStore, RegisterLocation, RegisterPart};
pub use config::EngineConfig;
pub use engine::{Engine, EngineWorkers};
pub use error::{EngineError, EngineResult};
pub use imports::{AnswerSet, ImportCoordinator, ImportExecution, StartImport};
pub use ledger::{AppendReceipt, MovementLedger};
pub use ledger_store::{LEDGER_STREAM, LedgerEntry};
pub use projector::{BalanceProjector, LowStockItem, PartAvailability, ReplayReport};
pub use reservations::{Fulfillment, ReservationManager, ReserveRequest};
pub use router::{BatchOutcome, ConfidenceRouter, Resolution, SubmitOutcome};
pub use workers::{ReorderAlert, SweepReport};
