//! Reservation manager: holds against available stock, their fulfillment and expiry.
//!
//! Every state change takes the reservation's balance-key lock first, so "check available,
//! then hold" cannot interleave with an exit at the same key, and the expiry sweep cannot
//! release a hold that a fulfillment is consuming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ledgergate_core::{DomainError, ReservationId};
use ledgergate_inventory::{BalanceChange, BalanceKey, LocationCode, Movement, PartCode, Reservation, ReservationStatus};

use crate::audit::{AuditRecord, AuditSink};
use crate::catalog::CatalogStore;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{AppendReceipt, Clearance, MovementLedger};
use crate::locks::KeyGuard;
use crate::store::KeyedStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub part_number: PartCode,
    pub location: LocationCode,
    pub quantity: i64,
    pub project: String,
    /// Lifetime of the hold in seconds.
    pub ttl_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub reservation: Reservation,
    pub receipt: AppendReceipt,
}

pub struct ReservationManager {
    ledger: Arc<MovementLedger>,
    catalog: Arc<CatalogStore>,
    reservations: Arc<dyn KeyedStore<ReservationId, Reservation>>,
    audit: Arc<dyn AuditSink>,
}

impl ReservationManager {
    pub fn new(
        ledger: Arc<MovementLedger>,
        catalog: Arc<CatalogStore>,
        reservations: Arc<dyn KeyedStore<ReservationId, Reservation>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            reservations,
            audit,
        }
    }

    pub fn reserve(&self, req: ReserveRequest, actor: &str) -> EngineResult<Reservation> {
        self.catalog.require_active_part(&req.part_number)?;
        self.catalog.require_active_location(&req.location)?;
        let key = BalanceKey::new(req.part_number, req.location);

        let ttl = chrono::Duration::try_seconds(req.ttl_secs)
            .ok_or_else(|| DomainError::validation("reservation ttl is too long"))?;
        let now = Utc::now();
        let reservation = Reservation::new(
            key.clone(),
            req.quantity,
            req.project,
            ttl,
            actor,
            now,
        )?;

        let guard = self.ledger.lock([key.clone()])?;
        let before = self.ledger.balance(&key)?;
        let after = before.with_hold(reservation.quantity)?;
        self.ledger.apply_hold(&guard, BalanceChange { before, after })?;
        self.reservations.upsert(reservation.id, reservation.clone());
        drop(guard);

        info!(
            reservation = %reservation.id,
            key = %key,
            quantity = reservation.quantity,
            expires_at = %reservation.expires_at,
            "reservation created"
        );
        Ok(reservation)
    }

    pub fn get(&self, id: ReservationId) -> EngineResult<Reservation> {
        self.reservations
            .get(&id)
            .ok_or_else(|| EngineError::from(DomainError::not_found(format!("reservation {id}"))))
    }

    pub fn list(&self, status: Option<ReservationStatus>) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .reservations
            .list()
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        out.sort_by_key(|r| r.created_at);
        out
    }

    /// Write the exit for the reserved stock and close the reservation.
    ///
    /// An overdue reservation is expired on the spot (hold released) and the call fails
    /// `Expired`.
    pub fn fulfill(&self, id: ReservationId, actor: &str) -> EngineResult<Fulfillment> {
        let key = self.get(id)?.key();
        let guard = self.ledger.lock([key])?;
        // Re-read under the lock: the sweeper or a cancel may have closed it meanwhile.
        let mut reservation = self.get(id)?;
        let now = Utc::now();

        if reservation.is_overdue(now) {
            self.expire_locked(&guard, &mut reservation, now)?;
            return Err(DomainError::expired(format!("reservation {id} expired at {}", reservation.expires_at)).into());
        }
        reservation.check_fulfillable(now)?;

        let movement = Movement::exit(
            reservation.part_number.clone(),
            reservation.location.clone(),
            reservation.quantity,
            actor,
        )
        .with_reservation(id)
        .with_note(format!("fulfils reservation {id} for {}", reservation.project));
        let receipt = self.ledger.append_locked(&guard, movement, Clearance::fulfillment(id))?;

        let before = reservation.clone();
        reservation.fulfill(receipt.movement_id, actor, now)?;
        self.reservations.upsert(id, reservation.clone());
        self.audit.record(
            AuditRecord::new(actor, "reservation.fulfilled", format!("reservation:{id}"))
                .with_before(&before)
                .with_after(&reservation),
        );
        info!(reservation = %id, movement = %receipt.movement_id, "reservation fulfilled");
        Ok(Fulfillment { reservation, receipt })
    }

    /// Release the hold without writing a movement.
    pub fn cancel(&self, id: ReservationId, actor: &str) -> EngineResult<Reservation> {
        let key = self.get(id)?.key();
        let guard = self.ledger.lock([key.clone()])?;
        let mut reservation = self.get(id)?;
        let before = reservation.clone();
        let now = Utc::now();

        reservation.cancel(actor, now)?;
        self.release_hold(&guard, &key, reservation.quantity)?;
        self.reservations.upsert(id, reservation.clone());
        self.audit.record(
            AuditRecord::new(actor, "reservation.cancelled", format!("reservation:{id}"))
                .with_before(&before)
                .with_after(&reservation),
        );
        info!(reservation = %id, "reservation cancelled");
        Ok(reservation)
    }

    /// Expire every active reservation past `expires_at`. Safe to run repeatedly.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> EngineResult<usize> {
        let mut expired = 0;
        for candidate in self.reservations.list().into_iter().filter(|r| r.is_overdue(now)) {
            let guard = self.ledger.lock([candidate.key()])?;
            let Some(mut reservation) = self.reservations.get(&candidate.id) else {
                continue;
            };
            match self.expire_locked(&guard, &mut reservation, now) {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(err) => warn!(reservation = %reservation.id, error = %err, "reservation expiry failed"),
            }
        }
        Ok(expired)
    }

    fn expire_locked(
        &self,
        guard: &KeyGuard<'_>,
        reservation: &mut Reservation,
        now: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let before = reservation.clone();
        if !reservation.expire(now) {
            return Ok(false);
        }
        self.release_hold(guard, &reservation.key(), reservation.quantity)?;
        self.reservations.upsert(reservation.id, reservation.clone());
        self.audit.record(
            AuditRecord::new("system:expiry-sweep", "reservation.expired", format!("reservation:{}", reservation.id))
                .with_before(&before)
                .with_after(&*reservation),
        );
        info!(reservation = %reservation.id, "reservation expired");
        Ok(true)
    }

    fn release_hold(&self, guard: &KeyGuard<'_>, key: &BalanceKey, quantity: i64) -> EngineResult<()> {
        let before = self.ledger.balance(key)?;
        let after = before.without_hold(quantity)?;
        self.ledger.apply_hold(guard, BalanceChange { before, after })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn reserve_fulfil_round_trip() {
        let f = Fixture::new();
        f.stock("A", 100);
        let r = f.reservations.reserve(f.reserve_request("A", 10), "ana").unwrap();
        assert_eq!(f.available("A"), 90);

        let done = f.reservations.fulfill(r.id, "ana").unwrap();
        assert_eq!(done.reservation.status, ReservationStatus::Fulfilled);
        assert_eq!(done.reservation.fulfilled_by, Some(done.receipt.movement_id));

        let b = f.balance("A");
        assert_eq!((b.quantity, b.reserved), (90, 0));
        let exits: Vec<_> = f
            .ledger
            .entries()
            .unwrap()
            .into_iter()
            .filter(|e| e.payload().reservation == Some(r.id))
            .collect();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].payload().quantity, 10);
    }

    #[test]
    fn cancel_restores_available_without_movements() {
        let f = Fixture::new();
        f.stock("A", 100);
        let before = f.ledger.entries().unwrap().len();
        let r = f.reservations.reserve(f.reserve_request("A", 10), "ana").unwrap();
        f.reservations.cancel(r.id, "ana").unwrap();
        assert_eq!(f.available("A"), 100);
        assert_eq!(f.ledger.entries().unwrap().len(), before);
        assert!(matches!(
            f.reservations.fulfill(r.id, "ana").unwrap_err().as_domain(),
            Some(DomainError::NotActive(_))
        ));
    }

    #[test]
    fn oversized_ttl_is_rejected_without_holding_stock() {
        let f = Fixture::new();
        f.stock("A", 100);
        for ttl_secs in [i64::MAX, 1_000_000_000_000_000] {
            let req = ReserveRequest {
                ttl_secs,
                ..f.reserve_request("A", 10)
            };
            let err = f.reservations.reserve(req, "ana").unwrap_err();
            assert!(matches!(err.as_domain(), Some(DomainError::Validation(_))), "{err}");
        }
        assert_eq!(f.available("A"), 100);
        assert!(f.reservations.list(None).is_empty());
    }

    #[test]
    fn cannot_reserve_more_than_available() {
        let f = Fixture::new();
        f.stock("A", 5);
        f.reservations.reserve(f.reserve_request("A", 3), "ana").unwrap();
        let err = f.reservations.reserve(f.reserve_request("A", 3), "ana").unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InsufficientAvailable { available: 2, .. })));
    }

    #[test]
    fn sweep_releases_overdue_holds_once() {
        let f = Fixture::new();
        f.stock("A", 10);
        let r = f.reservations.reserve(f.reserve_request("A", 4), "ana").unwrap();
        let later = r.expires_at + chrono::Duration::seconds(1);
        assert_eq!(f.reservations.sweep_expired(later).unwrap(), 1);
        assert_eq!(f.reservations.sweep_expired(later).unwrap(), 0);
        assert_eq!(f.available("A"), 10);
        assert_eq!(f.reservations.get(r.id).unwrap().status, ReservationStatus::Expired);
    }

    #[test]
    fn overdue_fulfilment_expires_instead() {
        let f = Fixture::new();
        f.stock("A", 10);
        let mut req = f.reserve_request("A", 4);
        req.ttl_secs = 1;
        let r = f.reservations.reserve(req, "ana").unwrap();
        thread::sleep(std::time::Duration::from_millis(1100));
        let err = f.reservations.fulfill(r.id, "ana").unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Expired(_))));
        assert_eq!(f.balance("A").reserved, 0);
        assert_eq!(f.balance("A").quantity, 10);
    }

    #[test]
    fn sweep_racing_fulfilment_never_double_releases() {
        let f = Arc::new(Fixture::new());
        f.stock("A", 100);
        let ids: Vec<_> = (0..20)
            .map(|_| f.reservations.reserve(f.reserve_request("A", 2), "ana").unwrap().id)
            .collect();
        let far_future = Utc::now() + chrono::Duration::days(365);

        let sweeper = {
            let f = f.clone();
            thread::spawn(move || f.reservations.sweep_expired(far_future).unwrap())
        };
        for id in &ids {
            let _ = f.reservations.fulfill(*id, "ana");
        }
        let swept = sweeper.join().unwrap();

        let fulfilled = ids
            .iter()
            .filter(|id| f.reservations.get(**id).unwrap().status == ReservationStatus::Fulfilled)
            .count();
        assert_eq!(fulfilled + swept, ids.len());
        let b = f.balance("A");
        assert_eq!(b.reserved, 0);
        assert_eq!(b.quantity, 100 - 2 * fulfilled as i64);
    }

    #[test]
    fn reservation_on_unknown_location_is_a_reference_error() {
        let f = Fixture::new();
        let mut req = f.reserve_request("A", 1);
        req.location = LocationCode::parse("ZZ").unwrap();
        assert!(matches!(
            f.reservations.reserve(req, "ana").unwrap_err().as_domain(),
            Some(DomainError::InvalidReference(_))
        ));
    }
}
