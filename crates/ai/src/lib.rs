//! `ledgergate-ai`
//!
//! **Responsibility:** the classifier collaborator boundary used by bulk imports.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not depend on inventory types (movements, balances, tasks).
//! - It must not mutate engine state.
//! - It returns **proposals** (questions, confidences, mappings, rows); the import coordinator
//!   decides what to do with them.

pub mod classifier;
pub mod result;
pub mod scripted;

pub use classifier::{
    ClassificationRequest, Classifier, ClassifierProposal, ClassifierQuestion, MappedRow, PriorRound,
};
pub use result::AiError;
pub use scripted::ScriptedClassifier;
