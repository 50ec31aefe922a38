//! Append-only event mechanics: event contract, envelopes, pub/sub and projections.
//!
//! Nothing here knows about stock. The ledger, the balance replay and the reorder watch
//! in `ledgergate-infra` are built on top of these pieces.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner};
