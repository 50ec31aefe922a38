//! Catalog reference data: part numbers and locations.
//!
//! Both are referenced forever by movements, so neither is ever hard-deleted. Deactivation
//! blocks new movements; history stays readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgergate_core::{DomainError, DomainResult, Entity};

/// Business identifier of a part number (e.g. "PN-00731").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartCode(String);

/// Business identifier of a location (e.g. "WH1-A-03").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationCode(String);

macro_rules! impl_code_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn parse(raw: impl AsRef<str>) -> DomainResult<Self> {
                let code = raw.as_ref().trim();
                if code.is_empty() {
                    return Err(DomainError::validation(concat!($name, " cannot be empty")));
                }
                if code.len() > 64 || code.chars().any(char::is_whitespace) {
                    return Err(DomainError::validation(format!(
                        "{} '{}' must be at most 64 characters without whitespace",
                        $name, code
                    )));
                }
                Ok(Self(code.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl core::str::FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

impl_code_newtype!(PartCode, "part number");
impl_code_newtype!(LocationCode, "location code");

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitOfMeasure {
    Unit,
    Meter,
    Kilogram,
    Liter,
    Pack,
}

/// Reorder/low-stock thresholds. The only part attributes that stay mutable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub minimum: i64,
    pub maximum: Option<i64>,
    pub reorder_point: i64,
}

impl Default for StockThresholds {
    fn default() -> Self {
        Self {
            minimum: 0,
            maximum: None,
            reorder_point: 0,
        }
    }
}

impl StockThresholds {
    pub fn validate(&self) -> DomainResult<()> {
        if self.minimum < 0 || self.reorder_point < 0 {
            return Err(DomainError::validation("thresholds cannot be negative"));
        }
        if let Some(max) = self.maximum {
            if max < self.minimum {
                return Err(DomainError::validation("maximum cannot be below minimum"));
            }
            if self.reorder_point > max {
                return Err(DomainError::validation("reorder point cannot exceed maximum"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartNumber {
    pub code: PartCode,
    pub description: String,
    pub unit: UnitOfMeasure,
    pub thresholds: StockThresholds,
    pub active: bool,
    pub registered_at: DateTime<Utc>,
}

impl PartNumber {
    pub fn new(
        code: PartCode,
        description: impl Into<String>,
        unit: UnitOfMeasure,
        thresholds: StockThresholds,
        registered_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        thresholds.validate()?;
        Ok(Self {
            code,
            description: description.into(),
            unit,
            thresholds,
            active: true,
            registered_at,
        })
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn set_thresholds(&mut self, thresholds: StockThresholds) -> DomainResult<()> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(())
    }

    /// Aggregate available stock at or below the reorder point.
    pub fn needs_reorder(&self, available: i64) -> bool {
        self.active && available <= self.thresholds.reorder_point
    }
}

impl Entity for PartNumber {
    type Id = PartCode;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Warehouse,
    Shelf,
    Vault,
    Quarantine,
    Transit,
    ProjectSite,
    CustomerSite,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Warehouse => "warehouse",
            LocationKind::Shelf => "shelf",
            LocationKind::Vault => "vault",
            LocationKind::Quarantine => "quarantine",
            LocationKind::Transit => "transit",
            LocationKind::ProjectSite => "project_site",
            LocationKind::CustomerSite => "customer_site",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub code: LocationCode,
    pub name: String,
    pub kind: LocationKind,
    pub parent: Option<LocationCode>,
    /// Informational. Movements are not checked against it.
    pub capacity: Option<i64>,
    pub active: bool,
}

impl Location {
    pub fn new(
        code: LocationCode,
        name: impl Into<String>,
        kind: LocationKind,
        parent: Option<LocationCode>,
        capacity: Option<i64>,
    ) -> DomainResult<Self> {
        if parent.as_ref() == Some(&code) {
            return Err(DomainError::validation("a location cannot be its own parent"));
        }
        if matches!(capacity, Some(c) if c <= 0) {
            return Err(DomainError::validation("capacity must be positive"));
        }
        Ok(Self {
            code,
            name: name.into(),
            kind,
            parent,
            capacity,
            active: true,
        })
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

impl Entity for Location {
    type Id = LocationCode;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed_and_reject_blank_or_spaced_input() {
        assert_eq!(PartCode::parse("  PN-1 ").unwrap().as_str(), "PN-1");
        assert!(PartCode::parse("   ").is_err());
        assert!(LocationCode::parse("WH 1").is_err());
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let bad = StockThresholds {
            minimum: 10,
            maximum: Some(5),
            reorder_point: 0,
        };
        assert!(bad.validate().is_err());

        let over = StockThresholds {
            minimum: 0,
            maximum: Some(50),
            reorder_point: 60,
        };
        assert!(over.validate().is_err());
    }

    #[test]
    fn reorder_fires_at_the_threshold_and_not_for_inactive_parts() {
        let mut part = PartNumber::new(
            PartCode::parse("PN-1").unwrap(),
            "bolt",
            UnitOfMeasure::Unit,
            StockThresholds {
                minimum: 0,
                maximum: None,
                reorder_point: 20,
            },
            Utc::now(),
        )
        .unwrap();

        assert!(part.needs_reorder(20));
        assert!(!part.needs_reorder(21));
        part.deactivate();
        assert!(!part.needs_reorder(0));
    }

    #[test]
    fn location_cannot_parent_itself() {
        let code = LocationCode::parse("A").unwrap();
        let err = Location::new(code.clone(), "A", LocationKind::Shelf, Some(code), None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
