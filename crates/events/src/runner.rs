//! Projection runner utilities (read model builders).
//!
//! Read models are **disposable**; events are the source of truth.
//! This module provides deterministic replay and cursor tracking without making storage
//! assumptions.

use thiserror::Error;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress through a stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    last_sequence_number: u64,
    applied: u64,
}

impl ProjectionCursor {
    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }

    /// Number of envelopes applied so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("non-monotonic sequence (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("envelope from stream '{found}' fed to projection of '{expected}'")]
    StreamMismatch { expected: String, found: String },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    stream: Option<String>,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            stream: None,
            cursor: None,
        }
    }

    /// Create a runner pinned to one stream name.
    ///
    /// Prevents accidentally folding envelopes from an unrelated log into the read model.
    pub fn for_stream(stream: impl Into<String>, projection: P) -> Self {
        Self {
            projection,
            stream: Some(stream.into()),
            cursor: None,
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Current cursor for this projection (if any envelopes were applied).
    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing stream pinning and strictly increasing sequences.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        if let Some(expected) = &self.stream {
            if expected != envelope.stream() {
                return Err(ProjectionError::StreamMismatch {
                    expected: expected.clone(),
                    found: envelope.stream().to_string(),
                });
            }
        }

        let found = envelope.sequence_number();
        let last = self.cursor.map(|c| c.last_sequence_number).unwrap_or(0);
        if found <= last {
            return Err(ProjectionError::NonMonotonicSequence { last, found });
        }

        self.projection.apply(envelope);
        let applied = self.cursor.map(|c| c.applied).unwrap_or(0) + 1;
        self.cursor = Some(ProjectionCursor {
            last_sequence_number: found,
            applied,
        });
        Ok(())
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::Event;

    #[derive(Debug, Clone)]
    struct Counted(i64);

    impl Event for Counted {
        fn event_type(&self) -> &'static str {
            "test.counted"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }

    #[derive(Default)]
    struct Sum(i64);

    impl Projection for Sum {
        type Ev = Counted;

        fn apply(&mut self, envelope: &EventEnvelope<Counted>) {
            self.0 += envelope.payload().0;
        }
    }

    fn env(seq: u64, v: i64) -> EventEnvelope<Counted> {
        EventEnvelope::new(Uuid::now_v7(), "test", seq, Utc::now(), Counted(v))
    }

    #[test]
    fn replay_folds_in_order_and_tracks_cursor() {
        let log = vec![env(1, 5), env(2, -2), env(3, 10)];
        let (sum, cursor) = ProjectionRunner::rebuild_from_scratch(Sum::default, &log).unwrap();
        assert_eq!(sum.0, 13);
        let cursor = cursor.unwrap();
        assert_eq!(cursor.last_sequence_number(), 3);
        assert_eq!(cursor.applied(), 3);
    }

    #[test]
    fn redelivered_envelope_is_rejected_without_side_effects() {
        let mut runner = ProjectionRunner::new(Sum::default());
        runner.apply(&env(1, 5)).unwrap();
        let err = runner.apply(&env(1, 5)).unwrap_err();
        assert_eq!(err, ProjectionError::NonMonotonicSequence { last: 1, found: 1 });
        assert_eq!(runner.projection().0, 5);
    }

    #[test]
    fn pinned_runner_refuses_foreign_streams() {
        let mut runner = ProjectionRunner::for_stream("ledger", Sum::default());
        let err = runner.apply(&env(1, 1)).unwrap_err();
        assert!(matches!(err, ProjectionError::StreamMismatch { .. }));
    }
}
