//! Inventory movement domain.
//!
//! This crate contains business rules for the stock ledger, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage, no locking). The infra crate
//! supplies storage, serialization of concurrent writers and the clock.

pub mod balance;
pub mod catalog;
pub mod hil;
pub mod movement;
pub mod negotiation;
pub mod policy;
pub mod reservation;

pub use balance::{Balance, BalanceChange, BalanceKey, project_movement};
pub use catalog::{Location, LocationCode, LocationKind, PartCode, PartNumber, StockThresholds, UnitOfMeasure};
pub use hil::{HIL_TASK_TTL_DAYS, HilDecision, HilTask, TaskKind, TaskStatus};
pub use movement::{Confidence, Movement, MovementDraft, MovementKind};
pub use negotiation::{
    FieldConfidence, ImportSession, NegotiationState, ProposedRow, Question, RoundAnswers, RoundOutcome,
};
pub use policy::{HilReason, LocationKinds, RoutingDecision, RoutingPolicy};
pub use reservation::{Reservation, ReservationStatus};
