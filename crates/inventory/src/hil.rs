//! Human-in-the-loop tasks: pending decisions that gate movements.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ledgergate_core::{DomainError, DomainResult, Entity, TaskId};

use crate::movement::{Confidence, Movement};
use crate::reservation::deadline;

/// Pending tasks expire after this many days.
pub const HIL_TASK_TTL_DAYS: i64 = 30;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Approval,
    Review,
    Classification,
    Escalation,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Approved => "approved",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Expired => "expired",
        }
    }
}

impl core::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "approved" => Ok(TaskStatus::Approved),
            "rejected" => Ok(TaskStatus::Rejected),
            "expired" => Ok(TaskStatus::Expired),
            other => Err(DomainError::validation(format!("unknown task status '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HilDecision {
    #[serde(alias = "approved")]
    Approve,
    #[serde(alias = "rejected")]
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HilTask {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Movements released together when the task is approved.
    pub payload: Vec<Movement>,
    pub confidence: Option<Confidence>,
    pub assignee: Option<String>,
    pub requested_by: String,
    pub reason: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl HilTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: TaskKind,
        payload: Vec<Movement>,
        confidence: Option<Confidence>,
        assignee: Option<String>,
        requested_by: impl Into<String>,
        reason: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if payload.is_empty() {
            return Err(DomainError::validation("a task must gate at least one movement"));
        }
        for m in &payload {
            m.validate_shape()?;
        }
        Ok(Self {
            id: TaskId::new(),
            kind,
            payload,
            confidence,
            assignee,
            requested_by: requested_by.into(),
            reason: reason.into(),
            status: TaskStatus::Pending,
            created_at: now,
            expires_at: deadline(now, ttl, "task")?,
            resolved_by: None,
            resolved_at: None,
            comment: None,
        })
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && now >= self.expires_at
    }

    /// Pending and within TTL.
    pub fn check_resolvable(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::already_resolved(format!(
                "task {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        if self.is_overdue(now) {
            return Err(DomainError::expired(format!(
                "task {} expired at {}",
                self.id, self.expires_at
            )));
        }
        Ok(())
    }

    /// Payload as it must be appended: each movement stamped with this task's id.
    pub fn gated_movements(&self) -> Vec<Movement> {
        self.payload
            .iter()
            .cloned()
            .map(|m| m.with_hil_task(self.id))
            .collect()
    }

    pub fn resolve(
        &mut self,
        decision: HilDecision,
        resolver: impl Into<String>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.check_resolvable(now)?;
        self.status = match decision {
            HilDecision::Approve => TaskStatus::Approved,
            HilDecision::Reject => TaskStatus::Rejected,
        };
        self.resolved_by = Some(resolver.into());
        self.resolved_at = Some(now);
        self.comment = comment;
        Ok(())
    }

    /// Expire if overdue; no-op otherwise.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_overdue(now) {
            return false;
        }
        self.status = TaskStatus::Expired;
        self.resolved_by = Some("system:expiry-sweep".to_string());
        self.resolved_at = Some(now);
        true
    }
}

impl Entity for HilTask {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
