use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: the log is the source of truth, so a projection can be
/// thrown away and rebuilt by replaying every envelope from the beginning. The live balance
/// table and the replay check in the ledger are two projections of the same movements; when
/// they disagree the live table is wrong.
///
/// ## Idempotency
///
/// Envelopes may be delivered more than once. Wrap a projection in a
/// [`ProjectionRunner`](crate::ProjectionRunner) to reject anything at or below the last
/// applied sequence number, or make `apply` naturally idempotent.
pub trait Projection {
    type Ev: Event;

    /// Apply a single envelope to the read model.
    ///
    /// Irrelevant events are ignored. This method does not fail: a projection that cannot
    /// interpret an event it claims to handle has a bug.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
