use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ledgergate_core::SessionId;

use crate::result::AiError;

/// Answers a human gave in an earlier round, replayed to the classifier verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorRound {
    pub round: u32,
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Everything the classifier gets for one round.
///
/// The request always carries the whole history: classifiers are expected to be stateless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub session_id: SessionId,
    pub round: u32,
    pub file_ref: String,
    pub schema: String,
    pub previous_rounds: Vec<PriorRound>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierQuestion {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A stock line read from the file under the proposed mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedRow {
    pub part_number: String,
    pub location: String,
    pub quantity: i64,
    #[serde(default)]
    pub serial: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierProposal {
    pub questions: Vec<ClassifierQuestion>,
    /// Target field -> confidence in \[0, 1\].
    pub field_confidences: BTreeMap<String, f64>,
    /// Source column -> target field.
    pub mapping: BTreeMap<String, String>,
    pub unmapped_columns: Vec<String>,
    pub rows: Vec<MappedRow>,
    pub ready: bool,
}

impl ClassifierProposal {
    /// Reject proposals the coordinator cannot interpret.
    pub fn validate(&self) -> Result<(), AiError> {
        if let Some((field, v)) = self
            .field_confidences
            .iter()
            .find(|(_, v)| !v.is_finite() || !(0.0..=1.0).contains(*v))
        {
            return Err(AiError::InferenceFailed(format!(
                "confidence for '{field}' out of range: {v}"
            )));
        }
        if let Some(q) = self.questions.iter().find(|q| q.id.trim().is_empty()) {
            return Err(AiError::InferenceFailed(format!(
                "question without id: '{}'",
                q.prompt
            )));
        }
        Ok(())
    }
}

/// Opaque classifier collaborator.
///
/// Implementations may call out to a model, a rules engine or a script; the coordinator only
/// sees the proposal. Calls must not have side effects the coordinator would need to undo.
pub trait Classifier: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn propose(&self, request: &ClassificationRequest) -> Result<ClassifierProposal, AiError>;
}

impl<C: Classifier + ?Sized> Classifier for std::sync::Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn propose(&self, request: &ClassificationRequest) -> Result<ClassifierProposal, AiError> {
        (**self).propose(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_confidence_is_an_inference_failure() {
        let p = ClassifierProposal {
            field_confidences: BTreeMap::from([("quantity".to_string(), 1.2)]),
            ..ClassifierProposal::default()
        };
        assert!(matches!(p.validate(), Err(AiError::InferenceFailed(_))));
    }

    #[test]
    fn missing_fields_default_when_parsing() {
        let p: ClassifierProposal = serde_json::from_str(r#"{"ready": true}"#).unwrap();
        assert!(p.ready);
        assert!(p.rows.is_empty());
        assert!(p.validate().is_ok());
    }
}
