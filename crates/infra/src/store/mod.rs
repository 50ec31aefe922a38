//! Keyed record storage for catalog entries, reservations, tasks and sessions.

pub mod keyed_store;

pub use keyed_store::{InMemoryKeyedStore, KeyedStore};
