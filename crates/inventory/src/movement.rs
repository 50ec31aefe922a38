//! Movements: the immutable facts the ledger is made of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledgergate_core::{DomainError, DomainResult, MovementId, ReservationId, TaskId, ValueObject};
use ledgergate_events::Event;

use crate::balance::BalanceKey;
use crate::catalog::{LocationCode, PartCode};

/// Classifier/operator confidence in \[0, 1\].
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub fn new(value: f64) -> DomainResult<Self> {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(DomainError::validation(format!(
                "confidence must be within [0, 1], got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// The weakest of a set of confidences; `None` for an empty set.
    pub fn min_of(values: impl IntoIterator<Item = Confidence>) -> Option<Confidence> {
        values
            .into_iter()
            .fold(None, |acc: Option<Confidence>, c| match acc {
                Some(a) if a.0 <= c.0 => Some(a),
                _ => Some(c),
            })
    }
}

impl ValueObject for Confidence {}

impl TryFrom<f64> for Confidence {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Goods received into a location.
    Entry,
    /// Goods issued out of a location (expedition, consumption, reservation fulfillment).
    Exit,
    /// Goods moved between two locations; both legs commit together.
    Transfer,
    /// Signed inventory correction at a single location.
    Adjustment,
    /// Write-off (damaged, lost, scrapped).
    Discard,
    /// Goods coming back into a location (customer/project return).
    Return,
}

impl MovementKind {
    pub const ALL: [MovementKind; 6] = [
        MovementKind::Entry,
        MovementKind::Exit,
        MovementKind::Transfer,
        MovementKind::Adjustment,
        MovementKind::Discard,
        MovementKind::Return,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entry => "entry",
            MovementKind::Exit => "exit",
            MovementKind::Transfer => "transfer",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Discard => "discard",
            MovementKind::Return => "return",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable stock movement.
///
/// `quantity` is a positive magnitude for every kind except `Adjustment`, where the sign
/// carries the direction. Corrections are new compensating movements; nothing here is ever
/// edited after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub kind: MovementKind,
    pub part_number: PartCode,
    pub quantity: i64,
    pub asset_serial: Option<String>,
    pub from_location: Option<LocationCode>,
    pub to_location: Option<LocationCode>,
    pub confidence: Option<Confidence>,
    /// HIL task whose approval released this movement.
    pub hil_task: Option<TaskId>,
    /// Reservation this movement fulfils; its hold is consumed with the stock.
    pub reservation: Option<ReservationId>,
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl Movement {
    fn base(kind: MovementKind, part_number: PartCode, quantity: i64, actor: impl Into<String>) -> Self {
        Self {
            id: MovementId::new(),
            kind,
            part_number,
            quantity,
            asset_serial: None,
            from_location: None,
            to_location: None,
            confidence: None,
            hil_task: None,
            reservation: None,
            actor: actor.into(),
            occurred_at: Utc::now(),
            note: None,
        }
    }

    pub fn entry(part: PartCode, to: LocationCode, quantity: i64, actor: impl Into<String>) -> Self {
        let mut m = Self::base(MovementKind::Entry, part, quantity, actor);
        m.to_location = Some(to);
        m
    }

    pub fn exit(part: PartCode, from: LocationCode, quantity: i64, actor: impl Into<String>) -> Self {
        let mut m = Self::base(MovementKind::Exit, part, quantity, actor);
        m.from_location = Some(from);
        m
    }

    pub fn transfer(
        part: PartCode,
        from: LocationCode,
        to: LocationCode,
        quantity: i64,
        actor: impl Into<String>,
    ) -> Self {
        let mut m = Self::base(MovementKind::Transfer, part, quantity, actor);
        m.from_location = Some(from);
        m.to_location = Some(to);
        m
    }

    pub fn adjustment(part: PartCode, at: LocationCode, delta: i64, actor: impl Into<String>) -> Self {
        let mut m = Self::base(MovementKind::Adjustment, part, delta, actor);
        m.to_location = Some(at);
        m
    }

    pub fn discard(part: PartCode, from: LocationCode, quantity: i64, actor: impl Into<String>) -> Self {
        let mut m = Self::base(MovementKind::Discard, part, quantity, actor);
        m.from_location = Some(from);
        m
    }

    pub fn return_to(part: PartCode, to: LocationCode, quantity: i64, actor: impl Into<String>) -> Self {
        let mut m = Self::base(MovementKind::Return, part, quantity, actor);
        m.to_location = Some(to);
        m
    }

    pub fn with_id(mut self, id: MovementId) -> Self {
        self.id = id;
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.asset_serial = Some(serial.into());
        self
    }

    pub fn with_reservation(mut self, reservation: ReservationId) -> Self {
        self.reservation = Some(reservation);
        self
    }

    pub fn with_hil_task(mut self, task: TaskId) -> Self {
        self.hil_task = Some(task);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The single location of an adjustment, whichever side the caller filled in.
    pub fn adjustment_location(&self) -> Option<&LocationCode> {
        self.to_location.as_ref().or(self.from_location.as_ref())
    }

    /// Structural checks that need no catalog or balance lookups.
    pub fn validate_shape(&self) -> DomainResult<()> {
        if self.quantity == 0 {
            return Err(DomainError::validation("quantity cannot be zero"));
        }
        if self.kind != MovementKind::Adjustment && self.quantity < 0 {
            return Err(DomainError::validation(format!(
                "{} quantity must be positive",
                self.kind
            )));
        }
        if self.actor.trim().is_empty() {
            return Err(DomainError::validation("actor is required"));
        }
        if let Some(serial) = &self.asset_serial {
            if serial.trim().is_empty() {
                return Err(DomainError::validation("asset serial cannot be blank"));
            }
            if self.quantity.unsigned_abs() != 1 {
                return Err(DomainError::validation("a serialized asset moves one unit at a time"));
            }
        }
        if self.reservation.is_some() && self.kind != MovementKind::Exit {
            return Err(DomainError::validation("only an exit can fulfil a reservation"));
        }

        let (from, to) = (self.from_location.is_some(), self.to_location.is_some());
        match self.kind {
            MovementKind::Entry | MovementKind::Return if !to || from => Err(DomainError::validation(
                format!("{} requires a destination and no source", self.kind),
            )),
            MovementKind::Exit | MovementKind::Discard if !from || to => Err(DomainError::validation(
                format!("{} requires a source and no destination", self.kind),
            )),
            MovementKind::Transfer if !(from && to) => {
                Err(DomainError::validation("transfer requires a source and a destination"))
            }
            MovementKind::Transfer if self.from_location == self.to_location => {
                Err(DomainError::validation("transfer source and destination must differ"))
            }
            MovementKind::Adjustment if from == to => {
                Err(DomainError::validation("adjustment requires exactly one location"))
            }
            _ => Ok(()),
        }
    }

    /// Quantity deltas per balance key, in ascending key order.
    ///
    /// Assumes `validate_shape` passed; a transfer yields both legs.
    pub fn deltas(&self) -> Vec<(BalanceKey, i64)> {
        let key = |loc: &LocationCode| BalanceKey::new(self.part_number.clone(), loc.clone());
        let mut out = Vec::with_capacity(2);
        match self.kind {
            MovementKind::Entry | MovementKind::Return => {
                if let Some(to) = &self.to_location {
                    out.push((key(to), self.quantity));
                }
            }
            MovementKind::Exit | MovementKind::Discard => {
                if let Some(from) = &self.from_location {
                    out.push((key(from), -self.quantity));
                }
            }
            MovementKind::Transfer => {
                if let Some(from) = &self.from_location {
                    out.push((key(from), -self.quantity));
                }
                if let Some(to) = &self.to_location {
                    out.push((key(to), self.quantity));
                }
            }
            MovementKind::Adjustment => {
                if let Some(at) = self.adjustment_location() {
                    out.push((key(at), self.quantity));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Balance keys touched by this movement, in lock order.
    pub fn keys(&self) -> Vec<BalanceKey> {
        self.deltas().into_iter().map(|(k, _)| k).collect()
    }
}

impl Event for Movement {
    fn event_type(&self) -> &'static str {
        match self.kind {
            MovementKind::Entry => "inventory.movement.entry",
            MovementKind::Exit => "inventory.movement.exit",
            MovementKind::Transfer => "inventory.movement.transfer",
            MovementKind::Adjustment => "inventory.movement.adjustment",
            MovementKind::Discard => "inventory.movement.discard",
            MovementKind::Return => "inventory.movement.return",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Caller-facing shape of a proposed movement (HTTP bodies, import rows).
///
/// The actor and timestamp are stamped by the engine, never trusted from input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDraft {
    #[serde(default)]
    pub id: Option<MovementId>,
    pub kind: MovementKind,
    pub part_number: PartCode,
    pub quantity: i64,
    #[serde(default)]
    pub asset_serial: Option<String>,
    #[serde(default)]
    pub from_location: Option<LocationCode>,
    #[serde(default)]
    pub to_location: Option<LocationCode>,
    #[serde(default)]
    pub note: Option<String>,
}

impl MovementDraft {
    pub fn into_movement(self, actor: impl Into<String>, occurred_at: DateTime<Utc>) -> Movement {
        Movement {
            id: self.id.unwrap_or_default(),
            kind: self.kind,
            part_number: self.part_number,
            quantity: self.quantity,
            asset_serial: self.asset_serial,
            from_location: self.from_location,
            to_location: self.to_location,
            confidence: None,
            hil_task: None,
            reservation: None,
            actor: actor.into(),
            occurred_at,
            note: self.note,
        }
    }
}
