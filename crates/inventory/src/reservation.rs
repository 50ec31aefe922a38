//! Reservations: time-bounded holds against available stock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use ledgergate_core::{DomainError, DomainResult, Entity, MovementId, ReservationId};

use crate::balance::BalanceKey;
use crate::catalog::{LocationCode, PartCode};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub part_number: PartCode,
    pub location: LocationCode,
    pub quantity: i64,
    pub project: String,
    pub status: ReservationStatus,
    pub reserved_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    /// Exit movement written on fulfillment.
    pub fulfilled_by: Option<MovementId>,
}

/// `now + ttl`, refusing deadlines a timestamp cannot hold.
pub(crate) fn deadline(now: DateTime<Utc>, ttl: Duration, what: &str) -> DomainResult<DateTime<Utc>> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| DomainError::validation(format!("{what} ttl is too long")))
}

impl Reservation {
    pub fn new(
        key: BalanceKey,
        quantity: i64,
        project: impl Into<String>,
        ttl: Duration,
        reserved_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("reservation quantity must be positive"));
        }
        if ttl <= Duration::zero() {
            return Err(DomainError::validation("reservation ttl must be positive"));
        }
        let project = project.into();
        if project.trim().is_empty() {
            return Err(DomainError::validation("reservation project is required"));
        }
        Ok(Self {
            id: ReservationId::new(),
            part_number: key.part_number,
            location: key.location,
            quantity,
            project,
            status: ReservationStatus::Active,
            reserved_by: reserved_by.into(),
            created_at: now,
            expires_at: deadline(now, ttl, "reservation")?,
            closed_at: None,
            closed_by: None,
            fulfilled_by: None,
        })
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.part_number.clone(), self.location.clone())
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && now >= self.expires_at
    }

    fn ensure_active(&self) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::not_active(format!(
                "reservation {} is {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn close(&mut self, status: ReservationStatus, by: impl Into<String>, now: DateTime<Utc>) {
        self.status = status;
        self.closed_at = Some(now);
        self.closed_by = Some(by.into());
    }

    /// Active, not overdue. An overdue reservation must be expired instead.
    pub fn check_fulfillable(&self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        if self.is_overdue(now) {
            return Err(DomainError::expired(format!(
                "reservation {} expired at {}",
                self.id, self.expires_at
            )));
        }
        Ok(())
    }

    pub fn fulfill(&mut self, movement: MovementId, by: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.check_fulfillable(now)?;
        self.fulfilled_by = Some(movement);
        self.close(ReservationStatus::Fulfilled, by, now);
        Ok(())
    }

    pub fn cancel(&mut self, by: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_active()?;
        self.close(ReservationStatus::Cancelled, by, now);
        Ok(())
    }

    /// Expire if overdue. Returns `false` (no-op) when already terminal or not yet due, so a
    /// sweep can run over the same reservation any number of times.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_overdue(now) {
            return false;
        }
        self.close(ReservationStatus::Expired, "system:expiry-sweep", now);
        true
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(now: DateTime<Utc>) -> Reservation {
        Reservation::new(
            BalanceKey::new(PartCode::parse("PN-X").unwrap(), LocationCode::parse("A").unwrap()),
            10,
            "PRJ-7",
            Duration::hours(1),
            "ana",
            now,
        )
        .unwrap()
    }

    #[test]
    fn terminal_reservations_refuse_further_transitions() {
        let now = Utc::now();
        let mut r = reservation(now);
        r.cancel("ana", now).unwrap();
        assert!(matches!(r.cancel("ana", now), Err(DomainError::NotActive(_))));
        assert!(matches!(
            r.fulfill(MovementId::new(), "ana", now),
            Err(DomainError::NotActive(_))
        ));
        assert!(!r.expire(now + Duration::days(1)));
        assert_eq!(r.status, ReservationStatus::Cancelled);
    }

    #[test]
    fn expiry_is_idempotent_and_time_bound() {
        let now = Utc::now();
        let mut r = reservation(now);
        assert!(!r.expire(now + Duration::minutes(59)));
        assert!(r.expire(now + Duration::hours(1)));
        assert!(!r.expire(now + Duration::hours(2)));
        assert_eq!(r.status, ReservationStatus::Expired);
    }

    #[test]
    fn overdue_reservation_cannot_be_fulfilled() {
        let now = Utc::now();
        let r = reservation(now);
        let err = r.check_fulfillable(now + Duration::hours(2)).unwrap_err();
        assert!(matches!(err, DomainError::Expired(_)));
    }

    #[test]
    fn rejects_non_positive_quantity_and_ttl() {
        let key = BalanceKey::new(PartCode::parse("PN-X").unwrap(), LocationCode::parse("A").unwrap());
        assert!(Reservation::new(key.clone(), 0, "P", Duration::hours(1), "ana", Utc::now()).is_err());
        assert!(Reservation::new(key, 1, "P", Duration::zero(), "ana", Utc::now()).is_err());
    }

    #[test]
    fn ttl_past_the_representable_range_is_a_validation_error() {
        let key = BalanceKey::new(PartCode::parse("PN-X").unwrap(), LocationCode::parse("A").unwrap());
        let err = Reservation::new(key, 1, "P", Duration::MAX, "ana", Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)), "{err}");
    }
}
