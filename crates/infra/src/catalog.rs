//! Catalog store: part numbers and locations every movement must reference.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use ledgergate_core::DomainError;
use ledgergate_inventory::{
    Location, LocationCode, LocationKind, PartCode, PartNumber, StockThresholds, UnitOfMeasure,
};

use crate::audit::{AuditRecord, AuditSink};
use crate::error::EngineResult;
use crate::store::KeyedStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPart {
    pub code: PartCode,
    pub description: String,
    pub unit: UnitOfMeasure,
    #[serde(default)]
    pub thresholds: StockThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterLocation {
    pub code: LocationCode,
    pub name: String,
    pub kind: LocationKind,
    #[serde(default)]
    pub parent: Option<LocationCode>,
    #[serde(default)]
    pub capacity: Option<i64>,
}

pub struct CatalogStore {
    parts: Arc<dyn KeyedStore<PartCode, PartNumber>>,
    locations: Arc<dyn KeyedStore<LocationCode, Location>>,
    audit: Arc<dyn AuditSink>,
}

impl CatalogStore {
    pub fn new(
        parts: Arc<dyn KeyedStore<PartCode, PartNumber>>,
        locations: Arc<dyn KeyedStore<LocationCode, Location>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            parts,
            locations,
            audit,
        }
    }

    pub fn register_part(&self, cmd: RegisterPart, actor: &str) -> EngineResult<PartNumber> {
        // Re-parse: deserialized codes skip validation.
        let code = PartCode::parse(cmd.code.as_str())?;
        let part = PartNumber::new(code.clone(), cmd.description, cmd.unit, cmd.thresholds, Utc::now())?;
        if !self.parts.insert_new(code.clone(), part.clone()) {
            return Err(DomainError::conflict(format!("part number {code} already registered")).into());
        }
        self.audit
            .record(AuditRecord::new(actor, "part.registered", format!("part:{code}")).with_after(&part));
        info!(part = %code, "part number registered");
        Ok(part)
    }

    pub fn deactivate_part(&self, code: &PartCode, actor: &str) -> EngineResult<PartNumber> {
        let before = self.part(code)?;
        let mut part = before.clone();
        part.deactivate();
        self.parts.upsert(code.clone(), part.clone());
        self.audit.record(
            AuditRecord::new(actor, "part.deactivated", format!("part:{code}"))
                .with_before(&before)
                .with_after(&part),
        );
        info!(part = %code, "part number deactivated");
        Ok(part)
    }

    pub fn set_thresholds(&self, code: &PartCode, thresholds: StockThresholds, actor: &str) -> EngineResult<PartNumber> {
        let before = self.part(code)?;
        let mut part = before.clone();
        part.set_thresholds(thresholds)?;
        self.parts.upsert(code.clone(), part.clone());
        self.audit.record(
            AuditRecord::new(actor, "part.thresholds_updated", format!("part:{code}"))
                .with_before(&before.thresholds)
                .with_after(&part.thresholds),
        );
        Ok(part)
    }

    pub fn part(&self, code: &PartCode) -> EngineResult<PartNumber> {
        self.parts
            .get(code)
            .ok_or_else(|| DomainError::not_found(format!("part number {code}")).into())
    }

    pub fn parts(&self) -> Vec<PartNumber> {
        let mut parts = self.parts.list();
        parts.sort_by(|a, b| a.code.cmp(&b.code));
        parts
    }

    pub fn register_location(&self, cmd: RegisterLocation, actor: &str) -> EngineResult<Location> {
        let code = LocationCode::parse(cmd.code.as_str())?;
        if let Some(parent) = &cmd.parent {
            let parent = self
                .locations
                .get(parent)
                .ok_or_else(|| DomainError::invalid_reference(format!("parent location {parent} is unknown")))?;
            if !parent.active {
                return Err(DomainError::invalid_reference(format!("parent location {} is deactivated", parent.code)).into());
            }
        }
        let location = Location::new(code.clone(), cmd.name, cmd.kind, cmd.parent, cmd.capacity)?;
        if !self.locations.insert_new(code.clone(), location.clone()) {
            return Err(DomainError::conflict(format!("location {code} already registered")).into());
        }
        self.audit
            .record(AuditRecord::new(actor, "location.registered", format!("location:{code}")).with_after(&location));
        info!(location = %code, kind = location.kind.as_str(), "location registered");
        Ok(location)
    }

    pub fn deactivate_location(&self, code: &LocationCode, actor: &str) -> EngineResult<Location> {
        let before = self.location(code)?;
        let mut location = before.clone();
        location.deactivate();
        self.locations.upsert(code.clone(), location.clone());
        self.audit.record(
            AuditRecord::new(actor, "location.deactivated", format!("location:{code}"))
                .with_before(&before)
                .with_after(&location),
        );
        info!(location = %code, "location deactivated");
        Ok(location)
    }

    pub fn location(&self, code: &LocationCode) -> EngineResult<Location> {
        self.locations
            .get(code)
            .ok_or_else(|| DomainError::not_found(format!("location {code}")).into())
    }

    pub fn locations(&self) -> Vec<Location> {
        let mut locations = self.locations.list();
        locations.sort_by(|a, b| a.code.cmp(&b.code));
        locations
    }

    /// The part exists and accepts new movements.
    pub fn require_active_part(&self, code: &PartCode) -> EngineResult<PartNumber> {
        match self.parts.get(code) {
            Some(p) if p.active => Ok(p),
            Some(_) => Err(DomainError::invalid_reference(format!("part number {code} is deactivated")).into()),
            None => Err(DomainError::invalid_reference(format!("part number {code} is unknown")).into()),
        }
    }

    pub fn require_active_location(&self, code: &LocationCode) -> EngineResult<Location> {
        match self.locations.get(code) {
            Some(l) if l.active => Ok(l),
            Some(_) => Err(DomainError::invalid_reference(format!("location {code} is deactivated")).into()),
            None => Err(DomainError::invalid_reference(format!("location {code} is unknown")).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::InMemoryAuditLog;
    use crate::error::EngineError;
    use crate::store::InMemoryKeyedStore;

    use super::*;

    fn catalog() -> CatalogStore {
        CatalogStore::new(
            Arc::new(InMemoryKeyedStore::new()),
            Arc::new(InMemoryKeyedStore::new()),
            Arc::new(InMemoryAuditLog::new()),
        )
    }

    fn part(code: &str) -> RegisterPart {
        RegisterPart {
            code: PartCode::parse(code).unwrap(),
            description: "relay".into(),
            unit: UnitOfMeasure::Unit,
            thresholds: StockThresholds::default(),
        }
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let c = catalog();
        c.register_part(part("PN-1"), "ana").unwrap();
        let err = c.register_part(part("PN-1"), "ana").unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn deactivated_part_is_kept_but_not_referenceable() {
        let c = catalog();
        c.register_part(part("PN-1"), "ana").unwrap();
        c.deactivate_part(&PartCode::parse("PN-1").unwrap(), "ana").unwrap();
        assert!(!c.part(&PartCode::parse("PN-1").unwrap()).unwrap().active);
        assert!(matches!(
            c.require_active_part(&PartCode::parse("PN-1").unwrap()),
            Err(EngineError::Domain(DomainError::InvalidReference(_)))
        ));
    }

    #[test]
    fn unknown_parent_location_is_rejected() {
        let c = catalog();
        let err = c
            .register_location(
                RegisterLocation {
                    code: LocationCode::parse("WH1-A").unwrap(),
                    name: "aisle".into(),
                    kind: LocationKind::Shelf,
                    parent: Some(LocationCode::parse("WH1").unwrap()),
                    capacity: None,
                },
                "ana",
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InvalidReference(_))));
    }
}
