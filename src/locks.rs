//! Per-customer mutual exclusion.
//!
//! Balance updates and daily cap checks are read-modify-write sequences over the row store,
//! which offers no transactions. Every engine holds the customer's lock from the first read to
//! the last write. Customers never share a lock, so they proceed in parallel.
//!
//! A lock entry is kept for every phone seen and never evicted. The map grows with the customers
//! table, which keeps every customer forever as well.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
pub struct CustomerLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a customer
    ///
    /// The access is released when the returned guard is dropped.
    pub async fn acquire(&self, phone: &str) -> OwnedMutexGuard<()> {
        // The map shard must not stay locked while waiting on the customer
        let lock = self.locks.entry(phone.to_string()).or_default().clone();
        lock.lock_owned().await
    }
}
