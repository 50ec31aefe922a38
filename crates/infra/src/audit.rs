//! Audit trail: one immutable record per terminal transition.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub actor: String,
    /// Dotted action name, e.g. `movement.appended`, `task.rejected`.
    pub action: String,
    /// `kind:id` of the record that changed.
    pub entity_ref: String,
    pub before: Option<JsonValue>,
    pub after: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, entity_ref: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            entity_ref: entity_ref.into(),
            before: None,
            after: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_before<T: Serialize>(mut self, before: &T) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    pub fn with_after<T: Serialize>(mut self, after: &T) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }
}

/// Filter for audit queries; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<String>,
    pub action: Option<String>,
    pub entity_ref: Option<String>,
}

impl AuditQuery {
    fn matches(&self, r: &AuditRecord) -> bool {
        self.actor.as_ref().is_none_or(|a| a == &r.actor)
            && self.action.as_ref().is_none_or(|a| a == &r.action)
            && self.entity_ref.as_ref().is_none_or(|e| e == &r.entity_ref)
    }
}

/// Audit collaborator. Recording must not fail the operation being audited.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, record: AuditRecord);

    fn query(&self, query: &AuditQuery) -> Vec<AuditRecord>;
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    inner: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<AuditRecord> {
        self.inner.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.inner.lock() {
            records.push(record);
        }
    }

    fn query(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        match self.inner.lock() {
            Ok(records) => records.iter().filter(|r| query.matches(r)).cloned().collect(),
            Err(_) => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_filters_on_every_set_field() {
        let log = InMemoryAuditLog::new();
        log.record(AuditRecord::new("ana", "task.rejected", "task:1").with_before(&vec![1, 2]));
        log.record(AuditRecord::new("bob", "task.approved", "task:2"));

        let by_action = log.query(&AuditQuery {
            action: Some("task.rejected".into()),
            ..AuditQuery::default()
        });
        assert_eq!(by_action.len(), 1);
        assert_eq!(by_action[0].before, Some(serde_json::json!([1, 2])));
        assert_eq!(log.query(&AuditQuery::default()).len(), 2);
    }
}
