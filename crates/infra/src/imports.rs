//! Import negotiation coordinator.
//!
//! Drives an [`ImportSession`] through classifier rounds. A round runs on a private copy of the
//! session and is stored only when it completes, so a classifier failure leaves the session as
//! it was before the round and the caller can retry with the same answers.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use ledgergate_ai::{ClassificationRequest, Classifier, ClassifierProposal, PriorRound};
use ledgergate_core::{DomainError, MovementId, SessionId};
use ledgergate_inventory::{
    Confidence, FieldConfidence, ImportSession, LocationCode, Movement, NegotiationState, PartCode, ProposedRow,
    Question, RoundOutcome,
};

use crate::audit::{AuditRecord, AuditSink};
use crate::error::{EngineError, EngineResult};
use crate::router::{BatchOutcome, ConfidenceRouter};
use crate::store::KeyedStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartImport {
    pub file_ref: String,
    #[serde(default)]
    pub schema: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSet {
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Round the answers were written for; a mismatch means someone else already answered.
    #[serde(default)]
    pub expected_round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportExecution {
    pub session: ImportSession,
    pub outcome: BatchOutcome,
}

struct Busy<'a> {
    set: &'a Mutex<HashSet<SessionId>>,
    id: SessionId,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

pub struct ImportCoordinator {
    classifier: Arc<dyn Classifier>,
    router: Arc<ConfidenceRouter>,
    sessions: Arc<dyn KeyedStore<SessionId, ImportSession>>,
    audit: Arc<dyn AuditSink>,
    import_threshold: f64,
    session_ttl: chrono::Duration,
    busy: Mutex<HashSet<SessionId>>,
}

impl ImportCoordinator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        router: Arc<ConfidenceRouter>,
        sessions: Arc<dyn KeyedStore<SessionId, ImportSession>>,
        audit: Arc<dyn AuditSink>,
        import_threshold: f64,
        session_ttl: chrono::Duration,
    ) -> Self {
        Self {
            classifier,
            router,
            sessions,
            audit,
            import_threshold,
            session_ttl,
            busy: Mutex::new(HashSet::new()),
        }
    }

    /// Open a session and run the first round. Nothing is kept if that round fails.
    pub fn start(&self, cmd: StartImport, actor: &str) -> EngineResult<ImportSession> {
        let mut session = ImportSession::open(cmd.file_ref, cmd.schema, actor, self.session_ttl, Utc::now())?;
        self.run_round(&mut session)?;
        self.sessions.upsert(session.id, session.clone());
        info!(session = %session.id, state = %session.state, "import session started");
        Ok(session)
    }

    pub fn get(&self, id: SessionId) -> EngineResult<ImportSession> {
        self.sessions
            .get(&id)
            .ok_or_else(|| EngineError::from(DomainError::not_found(format!("import session {id}"))))
    }

    /// Record the caller's answers and run the next round.
    pub fn answer(&self, id: SessionId, answers: AnswerSet, actor: &str) -> EngineResult<ImportSession> {
        let _busy = self.claim(id)?;
        let mut session = self.live(id)?;

        session.submit_answers(answers.answers, answers.comment, actor, answers.expected_round, Utc::now())?;
        if let Err(err) = self.run_round(&mut session) {
            warn!(session = %id, round = session.round, error = %err, "classifier round failed, session unchanged");
            return Err(err);
        }
        self.sessions.upsert(id, session.clone());
        Ok(session)
    }

    /// Turn the proposed rows into entries and route them as one batch.
    pub fn execute(&self, id: SessionId, actor: &str, assignee: Option<String>) -> EngineResult<ImportExecution> {
        let _busy = self.claim(id)?;
        let mut session = self.live(id)?;
        if session.state != NegotiationState::ReadyForProcessing {
            return Err(DomainError::conflict(format!("import session {id} is {}, not ready", session.state)).into());
        }

        let movements = session
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| row_movement(id, idx, row, actor))
            .collect::<EngineResult<Vec<_>>>()?;
        let outcome = self
            .router
            .submit_batch(movements, session.session_confidence(), assignee)?;

        let before = session.state;
        session.mark_executed(Utc::now())?;
        self.sessions.upsert(id, session.clone());
        self.audit.record(
            AuditRecord::new(actor, "session.executed", format!("session:{id}"))
                .with_before(&before)
                .with_after(&outcome),
        );
        info!(session = %id, rows = session.rows.len(), "import session executed");
        Ok(ImportExecution { session, outcome })
    }

    pub fn abort(&self, id: SessionId, actor: &str) -> EngineResult<ImportSession> {
        let _busy = self.claim(id)?;
        let mut session = self.get(id)?;
        let before = session.state;
        session.abort(Utc::now())?;
        self.sessions.upsert(id, session.clone());
        self.audit.record(
            AuditRecord::new(actor, "session.aborted", format!("session:{id}"))
                .with_before(&before)
                .with_after(&session.state),
        );
        info!(session = %id, "import session aborted");
        Ok(session)
    }

    /// Drop sessions past their TTL; open ones are aborted first. Busy sessions are skipped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let mut purged = 0;
        for session in self.sessions.list().into_iter().filter(|s| s.is_expired(now)) {
            let Ok(_busy) = self.claim(session.id) else {
                continue;
            };
            if !session.state.is_terminal() {
                self.audit.record(
                    AuditRecord::new("system:expiry-sweep", "session.aborted", format!("session:{}", session.id))
                        .with_before(&session.state)
                        .with_after(&NegotiationState::Aborted),
                );
            }
            self.sessions.remove(&session.id);
            purged += 1;
        }
        if purged > 0 {
            info!(purged, "expired import sessions purged");
        }
        Ok(purged)
    }

    fn claim(&self, id: SessionId) -> EngineResult<Busy<'_>> {
        let mut set = self.busy.lock().map_err(|_| EngineError::Poisoned("import busy set"))?;
        if !set.insert(id) {
            return Err(DomainError::session_busy(format!("import session {id} is running a round")).into());
        }
        Ok(Busy { set: &self.busy, id })
    }

    fn live(&self, id: SessionId) -> EngineResult<ImportSession> {
        let session = self.get(id)?;
        if session.is_expired(Utc::now()) {
            return Err(DomainError::expired(format!("import session {id} expired at {}", session.expires_at)).into());
        }
        Ok(session)
    }

    fn run_round(&self, session: &mut ImportSession) -> EngineResult<()> {
        let request = ClassificationRequest {
            session_id: session.id,
            round: session.round,
            file_ref: session.file_ref.clone(),
            schema: session.schema.clone(),
            previous_rounds: session
                .history
                .iter()
                .map(|h| PriorRound {
                    round: h.round,
                    answers: h.answers.clone(),
                    comment: h.comment.clone(),
                })
                .collect(),
        };
        let proposal = self.classifier.propose(&request)?;
        proposal.validate()?;
        let outcome = round_outcome(proposal)?;

        let state = session.absorb(outcome, self.import_threshold, Utc::now())?;
        info!(
            session = %session.id,
            round = session.round,
            classifier = self.classifier.name(),
            state = %state,
            blockers = session.blockers.len(),
            "classifier round complete"
        );
        Ok(())
    }
}

fn round_outcome(p: ClassifierProposal) -> EngineResult<RoundOutcome> {
    let field_confidences = p
        .field_confidences
        .into_iter()
        .map(|(field, v)| Ok(FieldConfidence { field, confidence: Confidence::new(v)? }))
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(RoundOutcome {
        questions: p
            .questions
            .into_iter()
            .map(|q| Question {
                id: q.id,
                prompt: q.prompt,
                field: q.field,
                options: q.options,
            })
            .collect(),
        field_confidences,
        mapping: p.mapping,
        unmapped_columns: p.unmapped_columns,
        rows: p
            .rows
            .into_iter()
            .map(|r| ProposedRow {
                part_number: r.part_number,
                location: r.location,
                quantity: r.quantity,
                asset_serial: r.serial,
            })
            .collect(),
        ready: p.ready,
    })
}

/// Entry movement for one row. The id is derived from session and row, so a retried execute
/// never books the same row twice.
fn row_movement(session: SessionId, idx: usize, row: &ProposedRow, actor: &str) -> EngineResult<Movement> {
    let part = PartCode::parse(&row.part_number)?;
    let location = LocationCode::parse(&row.location)?;
    let id = MovementId::from_uuid(Uuid::new_v5(session.as_uuid(), format!("row-{idx}").as_bytes()));

    let mut m = Movement::entry(part, location, row.quantity, actor)
        .with_id(id)
        .with_note(format!("import session {session}, row {}", idx + 1));
    if let Some(serial) = &row.asset_serial {
        m = m.with_serial(serial.clone());
    }
    Ok(m)
}
