//! Confidence router: the single gate between a proposed movement and the ledger.
//!
//! ```text
//! submit(movement, confidence)
//!   ├─ Autonomous  ──► ledger.append(Clearance::autonomous)
//!   └─ HilRequired ──► HilTask (pending) ── approve ──► ledger.append(Clearance::approved)
//!                                         ├─ reject  ──► audit only
//!                                         └─ ttl     ──► expired
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ledgergate_core::{DomainError, TaskId};
use ledgergate_inventory::{
    Confidence, HilDecision, HilReason, HilTask, LocationCode, LocationKinds, Movement, RoutingDecision, RoutingPolicy, TaskKind,
    TaskStatus,
};

use crate::audit::{AuditRecord, AuditSink};
use crate::catalog::CatalogStore;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{AppendReceipt, Clearance, MovementLedger};
use crate::store::KeyedStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Autonomous { receipt: AppendReceipt },
    PendingHil { task_id: TaskId, reason: HilReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Autonomous { receipts: Vec<AppendReceipt> },
    PendingHil { task_id: TaskId, reason: HilReason, gated: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub task: HilTask,
    /// Empty for a rejection.
    pub receipts: Vec<AppendReceipt>,
}

/// Marks a task as being resolved; concurrent resolutions of the same task fail fast.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<TaskId>>,
    id: TaskId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

pub struct ConfidenceRouter {
    policy: RoutingPolicy,
    ledger: Arc<MovementLedger>,
    catalog: Arc<CatalogStore>,
    tasks: Arc<dyn KeyedStore<TaskId, HilTask>>,
    audit: Arc<dyn AuditSink>,
    task_ttl: chrono::Duration,
    in_flight: Mutex<HashSet<TaskId>>,
}

impl ConfidenceRouter {
    pub fn new(
        policy: RoutingPolicy,
        ledger: Arc<MovementLedger>,
        catalog: Arc<CatalogStore>,
        tasks: Arc<dyn KeyedStore<TaskId, HilTask>>,
        audit: Arc<dyn AuditSink>,
        task_ttl: chrono::Duration,
    ) -> Self {
        Self {
            policy,
            ledger,
            catalog,
            tasks,
            audit,
            task_ttl,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Routing decision for one movement, with location kinds looked up in the catalog.
    pub fn decide(&self, movement: &Movement, confidence: Option<Confidence>) -> EngineResult<RoutingDecision> {
        let kind_of = |loc: Option<&LocationCode>| -> EngineResult<_> {
            loc.map(|l| self.catalog.location(l).map(|l| l.kind)).transpose()
        };
        let kinds = LocationKinds {
            from: kind_of(movement.from_location.as_ref())?,
            to: kind_of(movement.to_location.as_ref())?,
        };
        let decision = self.policy.decide(movement, confidence, kinds);
        debug!(movement = %movement.id, kind = movement.kind.as_str(), ?decision, "routing decision");
        Ok(decision)
    }

    /// Validate a caller-proposed movement before anything is decided.
    fn admit(&self, movement: &Movement) -> EngineResult<()> {
        movement.validate_shape()?;
        if movement.reservation.is_some() {
            return Err(DomainError::validation("reservation fulfillment goes through the reservation endpoint").into());
        }
        if movement.hil_task.is_some() {
            return Err(DomainError::validation("a new movement cannot claim an approval").into());
        }
        self.ledger.check_references(movement)
    }

    pub fn submit(
        &self,
        mut movement: Movement,
        confidence: Option<Confidence>,
        assignee: Option<String>,
    ) -> EngineResult<SubmitOutcome> {
        self.admit(&movement)?;
        movement.confidence = confidence;

        match self.decide(&movement, confidence)? {
            RoutingDecision::Autonomous => {
                let receipt = self.ledger.append(movement, Clearance::autonomous())?;
                Ok(SubmitOutcome::Autonomous { receipt })
            }
            RoutingDecision::HilRequired { reason } => {
                let requested_by = movement.actor.clone();
                let task = self.create_task(
                    TaskKind::Approval,
                    vec![movement],
                    confidence,
                    assignee,
                    &requested_by,
                    reason.to_string(),
                )?;
                Ok(SubmitOutcome::PendingHil {
                    task_id: task.id,
                    reason,
                })
            }
        }
    }

    /// Route a batch as one unit: every movement autonomous, or one task gating all of them.
    pub fn submit_batch(
        &self,
        movements: Vec<Movement>,
        confidence: Option<Confidence>,
        assignee: Option<String>,
    ) -> EngineResult<BatchOutcome> {
        let Some(first) = movements.first() else {
            return Err(DomainError::validation("batch is empty").into());
        };
        let requested_by = first.actor.clone();

        let mut movements = movements;
        let mut gating: Option<HilReason> = None;
        let mut gated = 0;
        for m in &mut movements {
            self.admit(m)?;
            m.confidence = confidence;
            if let RoutingDecision::HilRequired { reason } = self.decide(m, confidence)? {
                gated += 1;
                gating.get_or_insert(reason);
            }
        }

        match gating {
            None => {
                let mut receipts = Vec::with_capacity(movements.len());
                for m in movements {
                    receipts.push(self.ledger.append(m, Clearance::autonomous())?);
                }
                info!(count = receipts.len(), "batch appended autonomously");
                Ok(BatchOutcome::Autonomous { receipts })
            }
            Some(reason) => {
                let total = movements.len();
                let task = self.create_task(
                    TaskKind::Approval,
                    movements,
                    confidence,
                    assignee,
                    &requested_by,
                    format!("{gated} of {total} movement(s) need approval: {reason}"),
                )?;
                Ok(BatchOutcome::PendingHil {
                    task_id: task.id,
                    reason,
                    gated: total,
                })
            }
        }
    }

    pub fn create_task(
        &self,
        kind: TaskKind,
        payload: Vec<Movement>,
        confidence: Option<Confidence>,
        assignee: Option<String>,
        requested_by: &str,
        reason: impl Into<String>,
    ) -> EngineResult<HilTask> {
        let task = HilTask::new(
            kind,
            payload,
            confidence,
            assignee,
            requested_by,
            reason,
            self.task_ttl,
            Utc::now(),
        )?;
        self.tasks.upsert(task.id, task.clone());
        info!(
            task = %task.id,
            movements = task.payload.len(),
            assignee = task.assignee.as_deref().unwrap_or("-"),
            reason = %task.reason,
            "hil task created"
        );
        Ok(task)
    }

    pub fn task(&self, id: TaskId) -> EngineResult<HilTask> {
        self.tasks
            .get(&id)
            .ok_or_else(|| EngineError::from(DomainError::not_found(format!("hil task {id}"))))
    }

    pub fn list_tasks(&self, status: Option<TaskStatus>, assignee: Option<&str>) -> Vec<HilTask> {
        let mut out: Vec<HilTask> = self
            .tasks
            .list()
            .into_iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .filter(|t| assignee.is_none_or(|a| t.assignee.as_deref() == Some(a)))
            .collect();
        out.sort_by_key(|t| t.created_at);
        out
    }

    fn claim(&self, id: TaskId) -> EngineResult<InFlight<'_>> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| EngineError::Poisoned("hil in-flight set"))?;
        if !set.insert(id) {
            return Err(DomainError::conflict(format!("hil task {id} is being resolved")).into());
        }
        Ok(InFlight {
            set: &self.in_flight,
            id,
        })
    }

    /// Approve or reject a pending task.
    ///
    /// Approval appends every gated movement before the task is marked approved; if an append
    /// fails the task stays pending and the same call can be repeated (movement ids make the
    /// retry idempotent).
    pub fn resolve(
        &self,
        id: TaskId,
        decision: HilDecision,
        resolver: &str,
        comment: Option<String>,
    ) -> EngineResult<Resolution> {
        let _in_flight = self.claim(id)?;
        let mut task = self.task(id)?;
        let now = Utc::now();

        if task.is_overdue(now) {
            self.expire_task(&mut task, now);
            return Err(DomainError::expired(format!("hil task {id} expired at {}", task.expires_at)).into());
        }
        task.check_resolvable(now)?;

        let receipts = match decision {
            HilDecision::Approve => {
                let mut receipts = Vec::with_capacity(task.payload.len());
                for m in task.gated_movements() {
                    match self.ledger.append(m, Clearance::approved(id)) {
                        Ok(r) => receipts.push(r),
                        Err(err) => {
                            warn!(task = %id, error = %err, "approved movement refused, task stays pending");
                            return Err(err);
                        }
                    }
                }
                receipts
            }
            HilDecision::Reject => Vec::new(),
        };

        task.resolve(decision, resolver, comment, now)?;
        self.tasks.upsert(id, task.clone());

        let action = match decision {
            HilDecision::Approve => "task.approved",
            HilDecision::Reject => "task.rejected",
        };
        self.audit.record(
            AuditRecord::new(resolver, action, format!("task:{id}"))
                .with_before(&task.payload)
                .with_after(&task.status),
        );
        info!(task = %id, status = task.status.as_str(), resolver, "hil task resolved");
        Ok(Resolution { task, receipts })
    }

    /// What the requester sees: pending/approved, or the terminal failure.
    pub fn task_outcome(&self, id: TaskId) -> EngineResult<TaskStatus> {
        let task = self.task(id)?;
        match task.status {
            TaskStatus::Pending if task.is_overdue(Utc::now()) => {
                Err(DomainError::expired(format!("hil task {id} expired at {}", task.expires_at)).into())
            }
            TaskStatus::Pending | TaskStatus::Approved => Ok(task.status),
            TaskStatus::Rejected => Err(DomainError::policy_rejection(format!(
                "hil task {id} rejected by {}{}",
                task.resolved_by.as_deref().unwrap_or("unknown"),
                task.comment.as_deref().map(|c| format!(": {c}")).unwrap_or_default()
            ))
            .into()),
            TaskStatus::Expired => Err(DomainError::expired(format!("hil task {id} expired at {}", task.expires_at)).into()),
        }
    }

    /// Expire pending tasks past their TTL. Tasks being resolved right now are skipped.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let mut expired = 0;
        for task in self.tasks.list().into_iter().filter(|t| t.is_overdue(now)) {
            let Ok(_in_flight) = self.claim(task.id) else {
                continue;
            };
            if let Some(mut fresh) = self.tasks.get(&task.id) {
                if self.expire_task(&mut fresh, now) {
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }

    fn expire_task(&self, task: &mut HilTask, now: DateTime<Utc>) -> bool {
        if !task.expire(now) {
            return false;
        }
        self.tasks.upsert(task.id, task.clone());
        self.audit.record(
            AuditRecord::new("system:expiry-sweep", "task.expired", format!("task:{}", task.id))
                .with_before(&task.payload)
                .with_after(&task.status),
        );
        info!(task = %task.id, "hil task expired");
        true
    }
}
