//! Shared fixture for unit tests: an engine with one part and four locations.

use std::ops::Deref;
use std::sync::Arc;

use ledgergate_ai::ScriptedClassifier;
use ledgergate_inventory::{
    Balance, BalanceKey, Confidence, LocationCode, LocationKind, Movement, PartCode, UnitOfMeasure,
};

use crate::catalog::{RegisterLocation, RegisterPart};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::ledger::Clearance;
use crate::reservations::ReserveRequest;

pub fn pn() -> PartCode {
    PartCode::parse("PN-X").unwrap()
}

pub fn loc(s: &str) -> LocationCode {
    LocationCode::parse(s).unwrap()
}

pub fn conf(v: f64) -> Option<Confidence> {
    Some(Confidence::new(v).unwrap())
}

pub struct Fixture {
    engine: Engine,
}

impl Deref for Fixture {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl Fixture {
    /// Part `PN-X`; shelves `A` and `B`, vault `V1`, quarantine `Q1`.
    pub fn new() -> Self {
        Self::with_classifier(ScriptedClassifier::default())
    }

    pub fn with_classifier(classifier: ScriptedClassifier) -> Self {
        Self::with_config(EngineConfig::default(), classifier)
    }

    pub fn with_config(config: EngineConfig, classifier: ScriptedClassifier) -> Self {
        let engine = Engine::in_memory(config, Arc::new(classifier)).unwrap();
        engine
            .catalog
            .register_part(
                RegisterPart {
                    code: pn(),
                    description: "test part".into(),
                    unit: UnitOfMeasure::Unit,
                    thresholds: Default::default(),
                },
                "setup",
            )
            .unwrap();
        for (code, kind) in [
            ("A", LocationKind::Shelf),
            ("B", LocationKind::Shelf),
            ("V1", LocationKind::Vault),
            ("Q1", LocationKind::Quarantine),
        ] {
            engine
                .catalog
                .register_location(
                    RegisterLocation {
                        code: loc(code),
                        name: format!("location {code}"),
                        kind,
                        parent: None,
                        capacity: None,
                    },
                    "setup",
                )
                .unwrap();
        }
        Self { engine }
    }

    /// Book stock straight into the ledger.
    pub fn stock(&self, at: &str, quantity: i64) {
        self.ledger
            .append(Movement::entry(pn(), loc(at), quantity, "setup"), Clearance::autonomous())
            .unwrap();
    }

    pub fn balance(&self, at: &str) -> Balance {
        self.ledger.balance(&BalanceKey::new(pn(), loc(at))).unwrap()
    }

    pub fn quantity(&self, at: &str) -> i64 {
        self.balance(at).quantity
    }

    pub fn available(&self, at: &str) -> i64 {
        self.balance(at).available()
    }

    pub fn reserve_request(&self, at: &str, quantity: i64) -> ReserveRequest {
        ReserveRequest {
            part_number: pn(),
            location: loc(at),
            quantity,
            project: "PRJ-1".into(),
            ttl_secs: 3600,
        }
    }
}
