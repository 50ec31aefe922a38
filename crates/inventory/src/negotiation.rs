//! Import negotiation: the per-session state machine behind ambiguous bulk imports.
//!
//! ```text
//! Analyzing ──► QuestionsPending ──answers──► Analyzing ──► ... ──► ReadyForProcessing ──► Executed
//!     └──────────────┴──────────────────────────┴──────────────────────────┴──────────► Aborted
//! ```
//!
//! The session never advances on its own: a round only starts because the caller supplied
//! answers, and the outcome of a round only moves to `ReadyForProcessing` when nothing is left
//! to clarify.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ledgergate_core::{DomainError, DomainResult, Entity, SessionId};

use crate::movement::Confidence;
use crate::reservation::deadline;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationState {
    Analyzing,
    QuestionsPending,
    ReadyForProcessing,
    Executed,
    Aborted,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationState::Analyzing => "analyzing",
            NegotiationState::QuestionsPending => "questions_pending",
            NegotiationState::ReadyForProcessing => "ready_for_processing",
            NegotiationState::Executed => "executed",
            NegotiationState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Executed | NegotiationState::Aborted)
    }

    pub fn valid_transitions(&self) -> &'static [NegotiationState] {
        match self {
            NegotiationState::Analyzing => &[
                NegotiationState::QuestionsPending,
                NegotiationState::ReadyForProcessing,
                NegotiationState::Aborted,
            ],
            NegotiationState::QuestionsPending => &[NegotiationState::Analyzing, NegotiationState::Aborted],
            NegotiationState::ReadyForProcessing => &[NegotiationState::Executed, NegotiationState::Aborted],
            NegotiationState::Executed | NegotiationState::Aborted => &[],
        }
    }

    pub fn can_transition_to(&self, target: NegotiationState) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl core::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clarification the classifier needs from a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfidence {
    pub field: String,
    pub confidence: Confidence,
}

/// One stock line recovered from the file under the current mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedRow {
    pub part_number: String,
    pub location: String,
    pub quantity: i64,
    #[serde(default)]
    pub asset_serial: Option<String>,
}

/// Answers given for one round. Kept for the life of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundAnswers {
    pub round: u32,
    pub answers: BTreeMap<String, String>,
    pub comment: Option<String>,
    pub answered_by: String,
    pub answered_at: DateTime<Utc>,
}

/// What a classifier round produced, in domain terms.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub questions: Vec<Question>,
    pub field_confidences: Vec<FieldConfidence>,
    /// Source column -> target field.
    pub mapping: BTreeMap<String, String>,
    pub unmapped_columns: Vec<String>,
    pub rows: Vec<ProposedRow>,
    /// The classifier's own "ready" signal. Never sufficient on its own.
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: SessionId,
    pub file_ref: String,
    pub schema: String,
    pub created_by: String,
    pub state: NegotiationState,
    /// Round currently being analyzed or awaiting answers (1-based).
    pub round: u32,
    pub history: Vec<RoundAnswers>,
    pub questions: Vec<Question>,
    pub field_confidences: Vec<FieldConfidence>,
    pub mapping: BTreeMap<String, String>,
    pub unmapped_columns: Vec<String>,
    pub rows: Vec<ProposedRow>,
    /// Why the session is halted, empty when ready.
    pub blockers: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ImportSession {
    pub fn open(
        file_ref: impl Into<String>,
        schema: impl Into<String>,
        created_by: impl Into<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let file_ref = file_ref.into();
        if file_ref.trim().is_empty() {
            return Err(DomainError::validation("file reference is required"));
        }
        Ok(Self {
            id: SessionId::new(),
            file_ref,
            schema: schema.into(),
            created_by: created_by.into(),
            state: NegotiationState::Analyzing,
            round: 1,
            history: Vec::new(),
            questions: Vec::new(),
            field_confidences: Vec::new(),
            mapping: BTreeMap::new(),
            unmapped_columns: Vec::new(),
            rows: Vec::new(),
            blockers: Vec::new(),
            created_at: now,
            updated_at: now,
            expires_at: deadline(now, ttl, "session")?,
        })
    }

    fn transition(&mut self, to: NegotiationState, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(DomainError::conflict(format!(
                "session {} cannot move from {} to {}",
                self.id, self.state, to
            )));
        }
        self.state = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Weakest field confidence: the confidence of the whole import.
    pub fn session_confidence(&self) -> Option<Confidence> {
        Confidence::min_of(self.field_confidences.iter().map(|f| f.confidence))
    }

    /// Reasons the session must stop and wait for a human.
    pub fn blockers_for(outcome: &RoundOutcome, threshold: f64) -> Vec<String> {
        let mut out = Vec::new();
        if !outcome.questions.is_empty() {
            out.push(format!("{} question(s) pending", outcome.questions.len()));
        }
        for f in &outcome.field_confidences {
            if f.confidence.value() < threshold {
                out.push(format!(
                    "field '{}' confidence {:.2} below {:.2}",
                    f.field,
                    f.confidence.value(),
                    threshold
                ));
            }
        }
        if outcome.field_confidences.is_empty() {
            out.push("no field confidences reported".to_string());
        }
        if !outcome.unmapped_columns.is_empty() {
            out.push(format!("unmapped columns: {}", outcome.unmapped_columns.join(", ")));
        }
        if outcome.rows.is_empty() {
            out.push("no rows proposed".to_string());
        }
        if out.is_empty() && !outcome.ready {
            out.push("classifier has not signalled ready".to_string());
        }
        out
    }

    /// Record a classifier round and halt or become ready.
    pub fn absorb(&mut self, outcome: RoundOutcome, threshold: f64, now: DateTime<Utc>) -> DomainResult<NegotiationState> {
        if self.state != NegotiationState::Analyzing {
            return Err(DomainError::conflict(format!(
                "session {} is {}, not analyzing",
                self.id, self.state
            )));
        }
        let blockers = Self::blockers_for(&outcome, threshold);
        let next = if blockers.is_empty() {
            NegotiationState::ReadyForProcessing
        } else {
            NegotiationState::QuestionsPending
        };

        self.questions = outcome.questions;
        self.field_confidences = outcome.field_confidences;
        self.mapping = outcome.mapping;
        self.unmapped_columns = outcome.unmapped_columns;
        self.rows = outcome.rows;
        self.blockers = blockers;
        self.transition(next, now)?;
        Ok(next)
    }

    /// Accept the caller's answers for the current round and reopen analysis.
    ///
    /// `expected_round` guards against a retried request answering a round twice.
    pub fn submit_answers(
        &mut self,
        answers: BTreeMap<String, String>,
        comment: Option<String>,
        answered_by: impl Into<String>,
        expected_round: Option<u32>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.state != NegotiationState::QuestionsPending {
            return Err(DomainError::conflict(format!(
                "session {} is {}, no questions pending",
                self.id, self.state
            )));
        }
        if let Some(expected) = expected_round {
            if expected != self.round {
                return Err(DomainError::conflict(format!(
                    "answers are for round {expected} but session {} is at round {}",
                    self.id, self.round
                )));
            }
        }
        if answers.is_empty() && comment.as_deref().is_none_or(|c| c.trim().is_empty()) {
            return Err(DomainError::validation("an answer set or a comment is required"));
        }

        self.history.push(RoundAnswers {
            round: self.round,
            answers,
            comment,
            answered_by: answered_by.into(),
            answered_at: now,
        });
        self.round += 1;
        self.transition(NegotiationState::Analyzing, now)
    }

    pub fn mark_executed(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.state != NegotiationState::ReadyForProcessing {
            return Err(DomainError::conflict(format!(
                "session {} is {}, not ready for processing",
                self.id, self.state
            )));
        }
        self.transition(NegotiationState::Executed, now)
    }

    pub fn abort(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.state.is_terminal() {
            return Err(DomainError::not_active(format!(
                "session {} is already {}",
                self.id, self.state
            )));
        }
        self.transition(NegotiationState::Aborted, now)
    }
}

impl Entity for ImportSession {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
