use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use crate::classifier::{ClassificationRequest, Classifier, ClassifierProposal, ClassifierQuestion};
use crate::result::AiError;

/// Deterministic classifier that replays a fixed list of proposals, one per round.
///
/// Rounds past the end of the script repeat the last proposal. An empty script answers every
/// round with a single question explaining that no classifier is configured, so an import can
/// never become ready by accident.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    rounds: Vec<ClassifierProposal>,
    outages: Mutex<HashSet<u32>>,
}

impl ScriptedClassifier {
    pub fn new(rounds: Vec<ClassifierProposal>) -> Self {
        Self {
            rounds,
            outages: Mutex::new(HashSet::new()),
        }
    }

    /// Load a JSON array of proposals.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AiError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AiError::InvalidInput(format!("cannot read {}: {e}", path.display())))?;
        let rounds: Vec<ClassifierProposal> = serde_json::from_str(&raw)
            .map_err(|e| AiError::InvalidInput(format!("cannot parse {}: {e}", path.display())))?;
        for p in &rounds {
            p.validate()?;
        }
        Ok(Self::new(rounds))
    }

    /// Fail the given round once with `Unavailable`, as a flaky collaborator would.
    pub fn with_outage_on_round(self, round: u32) -> Self {
        if let Ok(mut outages) = self.outages.lock() {
            outages.insert(round);
        }
        self
    }

    fn unconfigured() -> ClassifierProposal {
        ClassifierProposal {
            questions: vec![ClassifierQuestion {
                id: "classifier".to_string(),
                prompt: "No classifier is configured; this file cannot be mapped automatically.".to_string(),
                field: None,
                options: Vec::new(),
            }],
            ..ClassifierProposal::default()
        }
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    fn propose(&self, request: &ClassificationRequest) -> Result<ClassifierProposal, AiError> {
        if request.round == 0 {
            return Err(AiError::InvalidInput("rounds start at 1".to_string()));
        }
        let tripped = self
            .outages
            .lock()
            .map_err(|_| AiError::Internal("outage table poisoned".to_string()))?
            .remove(&request.round);
        if tripped {
            return Err(AiError::Unavailable(format!(
                "scripted outage on round {}",
                request.round
            )));
        }

        let Some(last) = self.rounds.len().checked_sub(1) else {
            return Ok(Self::unconfigured());
        };
        let idx = (request.round as usize - 1).min(last);
        Ok(self.rounds[idx].clone())
    }
}
