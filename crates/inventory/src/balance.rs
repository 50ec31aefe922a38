//! Balances: the derived `(part number, location)` stock projection and its pure update rules.

use serde::{Deserialize, Serialize};

use ledgergate_core::{DomainError, DomainResult};

use crate::catalog::{LocationCode, PartCode};
use crate::movement::Movement;

/// Balance identity. Ordering is the global lock order (part first, then location).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub part_number: PartCode,
    pub location: LocationCode,
}

impl BalanceKey {
    pub fn new(part_number: PartCode, location: LocationCode) -> Self {
        Self {
            part_number,
            location,
        }
    }
}

impl core::fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.part_number, self.location)
    }
}

/// Stock at one key. `available` is always computed, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub part_number: PartCode,
    pub location: LocationCode,
    pub quantity: i64,
    pub reserved: i64,
}

impl Balance {
    pub fn empty(key: &BalanceKey) -> Self {
        Self {
            part_number: key.part_number.clone(),
            location: key.location.clone(),
            quantity: 0,
            reserved: 0,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.part_number.clone(), self.location.clone())
    }

    pub fn available(&self) -> i64 {
        self.quantity - self.reserved
    }

    /// `0 <= reserved <= quantity`.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.quantity < 0 || self.reserved < 0 || self.reserved > self.quantity {
            return Err(DomainError::invariant(format!(
                "balance {} out of bounds (quantity={}, reserved={})",
                self.key(),
                self.quantity,
                self.reserved
            )));
        }
        Ok(())
    }

    /// Apply a quantity delta.
    ///
    /// Decreases may only draw from `available`, unless `consume_hold` is set, in which case
    /// they draw from the reserved portion and release the same amount of hold.
    pub fn with_quantity_delta(&self, delta: i64, consume_hold: bool) -> DomainResult<Balance> {
        let mut next = self.clone();
        if delta >= 0 {
            if consume_hold {
                return Err(DomainError::validation("only a decrease can consume a hold"));
            }
            next.quantity = self
                .quantity
                .checked_add(delta)
                .ok_or_else(|| DomainError::validation("quantity overflow"))?;
            return Ok(next);
        }

        let requested = delta
            .checked_neg()
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if consume_hold {
            if self.reserved < requested {
                return Err(DomainError::invariant(format!(
                    "hold at {} is {} but fulfillment consumes {}",
                    self.key(),
                    self.reserved,
                    requested
                )));
            }
            next.reserved -= requested;
        } else if self.quantity < requested {
            return Err(DomainError::InsufficientBalance {
                part_number: self.part_number.to_string(),
                location: self.location.to_string(),
                requested,
                on_hand: self.quantity,
            });
        } else if self.available() < requested {
            return Err(DomainError::InsufficientAvailable {
                part_number: self.part_number.to_string(),
                location: self.location.to_string(),
                requested,
                available: self.available(),
            });
        }
        next.quantity -= requested;
        next.check_invariants()?;
        Ok(next)
    }

    /// Carve a hold out of `available`.
    pub fn with_hold(&self, quantity: i64) -> DomainResult<Balance> {
        if quantity <= 0 {
            return Err(DomainError::validation("hold quantity must be positive"));
        }
        if self.available() < quantity {
            return Err(DomainError::InsufficientAvailable {
                part_number: self.part_number.to_string(),
                location: self.location.to_string(),
                requested: quantity,
                available: self.available(),
            });
        }
        let mut next = self.clone();
        next.reserved += quantity;
        Ok(next)
    }

    /// Give a hold back to `available`.
    pub fn without_hold(&self, quantity: i64) -> DomainResult<Balance> {
        if quantity <= 0 || self.reserved < quantity {
            return Err(DomainError::invariant(format!(
                "cannot release {} from hold of {} at {}",
                quantity,
                self.reserved,
                self.key()
            )));
        }
        let mut next = self.clone();
        next.reserved -= quantity;
        Ok(next)
    }
}

/// One balance transition caused by a movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub before: Balance,
    pub after: Balance,
}

/// Project a movement onto the balances it touches.
///
/// Pure: `current` supplies the pre-movement balance for each key and nothing is written.
/// Either every leg succeeds (a transfer yields two changes) or the whole movement is refused,
/// so a caller that commits the returned changes together can never expose half a transfer.
pub fn project_movement(
    movement: &Movement,
    current: impl Fn(&BalanceKey) -> Balance,
) -> DomainResult<Vec<BalanceChange>> {
    movement.validate_shape()?;
    let consume_hold = movement.reservation.is_some();

    movement
        .deltas()
        .into_iter()
        .map(|(key, delta)| {
            let before = current(&key);
            let after = before.with_quantity_delta(delta, consume_hold)?;
            Ok(BalanceChange { before, after })
        })
        .collect()
}
