//! Per-balance-key write locks.
//!
//! Every writer to a `(part, location)` balance holds that key's lock for the whole
//! check-then-commit sequence. Keys are taken one at a time in ascending order, so two
//! multi-key writers (opposite transfers) cannot deadlock.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Condvar, Mutex, PoisonError};

use ledgergate_inventory::BalanceKey;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<BalanceKey>>,
    released: Condvar,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every key is held by the caller.
    pub fn acquire(&self, keys: impl IntoIterator<Item = BalanceKey>) -> EngineResult<KeyGuard<'_>> {
        let ordered: BTreeSet<BalanceKey> = keys.into_iter().collect();
        let mut guard = KeyGuard {
            locks: self,
            keys: Vec::with_capacity(ordered.len()),
        };

        let mut held = self.held.lock().map_err(|_| EngineError::Poisoned("key locks"))?;
        for key in ordered {
            while held.contains(&key) {
                held = self
                    .released
                    .wait(held)
                    .map_err(|_| EngineError::Poisoned("key locks"))?;
            }
            held.insert(key.clone());
            guard.keys.push(key);
        }
        Ok(guard)
    }

    fn release(&self, keys: &[BalanceKey]) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }

    #[cfg(test)]
    fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }
}

/// Keys held by one writer; released on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    keys: Vec<BalanceKey>,
}

impl KeyGuard<'_> {
    pub fn covers(&self, key: &BalanceKey) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> &[BalanceKey] {
        &self.keys
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.keys);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use ledgergate_inventory::{LocationCode, PartCode};

    use super::*;

    fn key(loc: &str) -> BalanceKey {
        BalanceKey::new(PartCode::parse("PN-X").unwrap(), LocationCode::parse(loc).unwrap())
    }

    #[test]
    fn guard_releases_on_drop() {
        let locks = KeyLocks::new();
        {
            let g = locks.acquire([key("B"), key("A"), key("A")]).unwrap();
            assert_eq!(g.keys(), &[key("A"), key("B")]);
            assert_eq!(locks.held_count(), 2);
        }
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn opposite_order_acquisitions_do_not_deadlock() {
        let locks = Arc::new(KeyLocks::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let locks = locks.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let keys = if i % 2 == 0 { [key("A"), key("B")] } else { [key("B"), key("A")] };
                        let _g = locks.acquire(keys).unwrap();
                        thread::sleep(Duration::from_micros(10));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(locks.held_count(), 0);
    }
}
