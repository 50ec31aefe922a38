//! The routing policy table: autonomous execution vs. human approval.
//!
//! This is the only place thresholds and overrides live. The router in infra feeds it the
//! catalog facts it needs (location kinds) and acts on the decision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ledgergate_core::{DomainError, DomainResult};

use crate::catalog::{LocationCode, LocationKind};
use crate::movement::{Confidence, Movement, MovementKind};

/// Why a movement needs a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum HilReason {
    /// The kind is gated regardless of confidence.
    AlwaysGated { kind: MovementKind },
    /// A transfer crosses into a restricted location kind.
    RestrictedDestination {
        location: LocationCode,
        kind: LocationKind,
    },
    /// No confidence score was supplied.
    MissingConfidence,
    BelowThreshold { confidence: f64, threshold: f64 },
}

impl core::fmt::Display for HilReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HilReason::AlwaysGated { kind } => write!(f, "{kind} movements always require approval"),
            HilReason::RestrictedDestination { location, kind } => {
                write!(f, "transfer into restricted {} location {location}", kind.as_str())
            }
            HilReason::MissingConfidence => f.write_str("no confidence score supplied"),
            HilReason::BelowThreshold {
                confidence,
                threshold,
            } => write!(f, "confidence {confidence:.2} below threshold {threshold:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum RoutingDecision {
    Autonomous,
    HilRequired { reason: HilReason },
}

impl RoutingDecision {
    pub fn is_autonomous(&self) -> bool {
        matches!(self, RoutingDecision::Autonomous)
    }
}

/// Kinds of the locations a movement touches, resolved from the catalog by the caller.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LocationKinds {
    pub from: Option<LocationKind>,
    pub to: Option<LocationKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPolicy {
    /// Minimum confidence for autonomous execution, per movement kind.
    pub thresholds: BTreeMap<MovementKind, f64>,
    /// Used for kinds missing from `thresholds`.
    pub default_threshold: f64,
    /// Kinds that always go to a human.
    pub always_hil: Vec<MovementKind>,
    /// Transfers into these kinds (from a different kind) always go to a human.
    pub restricted_destinations: Vec<LocationKind>,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            thresholds: BTreeMap::from([
                (MovementKind::Entry, 0.80),
                (MovementKind::Return, 0.85),
                (MovementKind::Transfer, 0.85),
                (MovementKind::Exit, 0.90),
            ]),
            default_threshold: 0.95,
            always_hil: vec![MovementKind::Adjustment, MovementKind::Discard],
            restricted_destinations: vec![LocationKind::Vault, LocationKind::Quarantine],
        }
    }
}

impl RoutingPolicy {
    pub fn validate(&self) -> DomainResult<()> {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_range(self.default_threshold) {
            return Err(DomainError::validation("default threshold must be within [0, 1]"));
        }
        if let Some((kind, v)) = self.thresholds.iter().find(|(_, v)| !in_range(**v)) {
            return Err(DomainError::validation(format!(
                "threshold for {kind} must be within [0, 1], got {v}"
            )));
        }
        Ok(())
    }

    pub fn threshold_for(&self, kind: MovementKind) -> f64 {
        self.thresholds
            .get(&kind)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// Pure routing decision.
    ///
    /// Overrides are checked before the score: an always-gated kind or a restricted
    /// destination needs a human even at confidence 1.0. Otherwise
    /// `confidence >= threshold` is autonomous.
    pub fn decide(
        &self,
        movement: &Movement,
        confidence: Option<Confidence>,
        kinds: LocationKinds,
    ) -> RoutingDecision {
        let hil = |reason| RoutingDecision::HilRequired { reason };

        if self.always_hil.contains(&movement.kind) {
            return hil(HilReason::AlwaysGated {
                kind: movement.kind,
            });
        }

        if movement.kind == MovementKind::Transfer {
            if let (Some(to_kind), Some(to)) = (kinds.to, movement.to_location.as_ref()) {
                let crosses = kinds.from != Some(to_kind);
                if crosses && self.restricted_destinations.contains(&to_kind) {
                    return hil(HilReason::RestrictedDestination {
                        location: to.clone(),
                        kind: to_kind,
                    });
                }
            }
        }

        let Some(confidence) = confidence else {
            return hil(HilReason::MissingConfidence);
        };

        let threshold = self.threshold_for(movement.kind);
        if confidence.value() >= threshold {
            RoutingDecision::Autonomous
        } else {
            hil(HilReason::BelowThreshold {
                confidence: confidence.value(),
                threshold,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PartCode;

    fn pn() -> PartCode {
        PartCode::parse("PN-X").unwrap()
    }

    fn loc(s: &str) -> LocationCode {
        LocationCode::parse(s).unwrap()
    }

    fn c(v: f64) -> Option<Confidence> {
        Some(Confidence::new(v).unwrap())
    }

    #[test]
    fn exactly_at_threshold_is_autonomous_and_just_below_is_not() {
        let policy = RoutingPolicy::default();
        let m = Movement::entry(pn(), loc("A"), 5, "ana");
        assert!(policy.decide(&m, c(0.80), LocationKinds::default()).is_autonomous());
        assert!(matches!(
            policy.decide(&m, c(0.7999), LocationKinds::default()),
            RoutingDecision::HilRequired {
                reason: HilReason::BelowThreshold { .. }
            }
        ));
    }

    #[test]
    fn adjustments_and_discards_ignore_confidence() {
        let policy = RoutingPolicy::default();
        let adj = Movement::adjustment(pn(), loc("A"), 3, "ana");
        let dis = Movement::discard(pn(), loc("A"), 3, "ana");
        for m in [adj, dis] {
            assert!(!policy.decide(&m, c(1.0), LocationKinds::default()).is_autonomous());
        }
    }

    #[test]
    fn transfer_into_a_vault_is_gated_but_vault_to_vault_is_not() {
        let policy = RoutingPolicy::default();
        let m = Movement::transfer(pn(), loc("A"), loc("V1"), 1, "ana");
        let crossing = LocationKinds {
            from: Some(LocationKind::Shelf),
            to: Some(LocationKind::Vault),
        };
        assert!(matches!(
            policy.decide(&m, c(0.99), crossing),
            RoutingDecision::HilRequired {
                reason: HilReason::RestrictedDestination { .. }
            }
        ));

        let inside = LocationKinds {
            from: Some(LocationKind::Vault),
            to: Some(LocationKind::Vault),
        };
        assert!(policy.decide(&m, c(0.99), inside).is_autonomous());
    }

    #[test]
    fn missing_confidence_needs_a_human() {
        let m = Movement::exit(pn(), loc("A"), 1, "ana");
        assert_eq!(
            RoutingPolicy::default().decide(&m, None, LocationKinds::default()),
            RoutingDecision::HilRequired {
                reason: HilReason::MissingConfidence
            }
        );
    }

    #[test]
    fn policy_table_loads_from_json_with_defaults() {
        let policy: RoutingPolicy =
            serde_json::from_str(r#"{"thresholds": {"exit": 0.5}}"#).unwrap();
        assert_eq!(policy.threshold_for(MovementKind::Exit), 0.5);
        assert_eq!(policy.threshold_for(MovementKind::Entry), 0.95);
        assert!(policy.always_hil.contains(&MovementKind::Adjustment));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let mut policy = RoutingPolicy::default();
        policy.thresholds.insert(MovementKind::Exit, 1.5);
        assert!(policy.validate().is_err());
    }
}
