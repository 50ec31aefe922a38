/// Who is acting on this request, as stated by the `x-actor` header.
///
/// Identity only; authentication happens in front of this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: String,
}

impl ActorContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self { actor: actor.into() }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}
