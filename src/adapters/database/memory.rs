use crate::{
    domain::{Customer, EntryKind, LedgerEntry, TierThresholds},
    ports::{
        directory::{self, DirectoryPort, PointsDelta},
        ledger::{self, LedgerPort},
    },
};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// In-memory row store holding the customers and ledger tables
#[derive(Clone, Debug)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    tiers: TierThresholds,
}

#[derive(Debug, Default)]
struct Tables {
    customers: HashMap<String, Customer>,
    /// Ledger rows per customer, oldest first
    entries: HashMap<String, Vec<LedgerEntry>>,
    /// Source message id to the entry it produced
    messages: HashMap<String, LedgerEntry>,
}

impl MemoryDatabase {
    pub fn new(tiers: TierThresholds) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            tiers,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, ErasedPoisonError> {
        Ok(self.tables.lock()?)
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new(TierThresholds::default())
    }
}

#[async_trait::async_trait]
impl DirectoryPort for MemoryDatabase {
    async fn get_or_create(&self, phone: &str, name: &str) -> Result<Customer, directory::Error> {
        let mut tables = self.lock()?;
        let customer = tables
            .customers
            .entry(phone.to_string())
            .or_insert_with(|| Customer::new(phone, name, &self.tiers));
        if customer.name.is_empty() && !name.is_empty() {
            customer.name = name.to_string();
        }
        // Thresholds may have been retuned since the last write
        customer.tier = self.tiers.tier_for(customer.points);

        Ok(customer.clone())
    }

    async fn apply_delta(
        &self,
        phone: &str,
        delta: PointsDelta,
    ) -> Result<Customer, directory::Error> {
        let mut tables = self.lock()?;
        let customer = match tables.customers.entry(phone.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Customer::new(phone, "", &self.tiers)),
        };

        // Already folded into the aggregate
        if delta.seq <= customer.applied_seq {
            return Ok(customer.clone());
        }

        let new_points = if delta.points >= 0 {
            customer
                .points
                .checked_add(delta.points.unsigned_abs())
                .ok_or(directory::Error::PointsOverflow {
                    current_points: customer.points,
                    delta_points: delta.points,
                })?
        } else {
            // Return an error if this would make the number of loyalty points negative
            customer
                .points
                .checked_sub(delta.points.unsigned_abs())
                .ok_or(directory::Error::InsufficientBalance {
                    current_points: customer.points,
                    delta_points: delta.points,
                })?
        };

        customer.points = new_points;
        customer.tier = self.tiers.tier_for(customer.points);
        if delta.touches_visit {
            customer.visits += 1;
        }
        if delta.invoice.is_some() {
            customer.last_invoice = delta.invoice;
        }
        customer.applied_seq = delta.seq;
        customer.updated_at = delta.at;

        Ok(customer.clone())
    }
}

#[async_trait::async_trait]
impl LedgerPort for MemoryDatabase {
    async fn append(&self, mut entry: LedgerEntry) -> Result<LedgerEntry, ledger::Error> {
        let mut tables = self.lock()?;

        if let Some(existing) = tables.messages.get(&entry.message_id) {
            return Err(ledger::Error::DuplicateMessage {
                existing: Box::new(existing.clone()),
            });
        }

        let entries = tables.entries.entry(entry.phone.clone()).or_default();
        entry.seq = entries.len() as u64 + 1;
        entries.push(entry.clone());
        tables
            .messages
            .insert(entry.message_id.clone(), entry.clone());

        Ok(entry)
    }

    async fn find_by_message(&self, message_id: &str) -> Result<Option<LedgerEntry>, ledger::Error> {
        Ok(self.lock()?.messages.get(message_id).cloned())
    }

    async fn sum_accrual_today(
        &self,
        phone: &str,
        business_day: NaiveDate,
        timezone: Tz,
    ) -> Result<u64, ledger::Error> {
        let tables = self.lock()?;
        let sum = tables
            .entries
            .get(phone)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.kind == EntryKind::Accrual && entry.delta_points > 0)
                    .filter(|entry| entry.at.with_timezone(&timezone).date_naive() == business_day)
                    .fold(0_u64, |sum, entry| {
                        sum.saturating_add(entry.delta_points.unsigned_abs())
                    })
            })
            .unwrap_or(0);

        Ok(sum)
    }

    async fn entries_since(
        &self,
        phone: &str,
        after_seq: u64,
    ) -> Result<Vec<LedgerEntry>, ledger::Error> {
        let tables = self.lock()?;
        let entries = tables
            .entries
            .get(phone)
            .map(|entries| entries.iter().skip(after_seq as usize).cloned().collect())
            .unwrap_or_default();

        Ok(entries)
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for ErasedPoisonError {
    fn from(err: PoisonError<T>) -> Self {
        Self(err.to_string())
    }
}

impl From<ErasedPoisonError> for directory::Error {
    fn from(err: ErasedPoisonError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<ErasedPoisonError> for ledger::Error {
    fn from(err: ErasedPoisonError) -> Self {
        Self::Adapter(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RedemptionCode, Tier};
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::*;
    use rust_decimal::Decimal;
    use speculoos::prelude::*;

    const PHONE: &str = "201001234567";

    fn delta(seq: u64, points: i64) -> PointsDelta {
        PointsDelta {
            seq,
            points,
            touches_visit: points > 0,
            invoice: None,
            at: Utc::now(),
        }
    }

    fn accrual(at: DateTime<Utc>, points: u64, message_id: &str) -> LedgerEntry {
        LedgerEntry::accrual(PHONE, at, points, Decimal::from(100), None, message_id)
    }

    #[fixture]
    fn timezone() -> Tz {
        Tz::Africa__Cairo
    }

    #[tokio::test]
    async fn test_get_or_create() {
        let database = MemoryDatabase::default();

        // Creating the customer
        let res = database.get_or_create(PHONE, "").await;
        assert_that!(res)
            .is_ok()
            .matches(|customer| customer.points == 0 && customer.tier == Tier::Bronze);

        // A later call keeps the same aggregate but fills in the missing name
        let res = database.get_or_create(PHONE, "Mona").await;
        assert_that!(res)
            .is_ok()
            .matches(|customer| customer.name == "Mona");
        let res = database.get_or_create(PHONE, "Someone else").await;
        assert_that!(res)
            .is_ok()
            .matches(|customer| customer.name == "Mona");
    }

    #[tokio::test]
    async fn test_apply_delta_retrieve() {
        let database = MemoryDatabase::default();

        let res = database.apply_delta(PHONE, delta(1, 25)).await;
        assert_that!(res).is_ok().matches(|customer| {
            customer.points == 25 && customer.tier == Tier::Silver && customer.visits == 1
        });

        // Retrieving the customer should return the updated total
        let res = database.get_or_create(PHONE, "").await;
        assert_that!(res)
            .is_ok()
            .matches(|customer| customer.points == 25 && customer.applied_seq == 1);
    }

    #[tokio::test]
    async fn test_apply_delta_replayed_seq() {
        let database = MemoryDatabase::default();
        database.apply_delta(PHONE, delta(1, 10)).await.unwrap();

        // Applying the same sequence again is a no-op
        let res = database.apply_delta(PHONE, delta(1, 10)).await;
        assert_that!(res)
            .is_ok()
            .matches(|customer| customer.points == 10 && customer.visits == 1);
    }

    #[tokio::test]
    async fn test_negative_points_empty() {
        let database = MemoryDatabase::default();
        let res = database.apply_delta(PHONE, delta(1, -5)).await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, directory::Error::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_apply_delta_overflow() {
        let database = MemoryDatabase::default();
        database.apply_delta(PHONE, delta(1, i64::MAX)).await.unwrap();
        database.apply_delta(PHONE, delta(2, i64::MAX)).await.unwrap();

        // The balance is past i64::MAX but still fits the aggregate
        let res = database.get_or_create(PHONE, "").await;
        assert_that!(res)
            .is_ok()
            .matches(|customer| customer.points == u64::MAX - 1);

        let res = database.apply_delta(PHONE, delta(3, 2)).await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, directory::Error::PointsOverflow { .. }));
    }

    #[tokio::test]
    async fn test_negative_points_exists() {
        let database = MemoryDatabase::default();
        assert_that!(database.apply_delta(PHONE, delta(1, 5)).await).is_ok();
        // Removing the current number of points is OK
        assert_that!(database.apply_delta(PHONE, delta(2, -5)).await)
            .is_ok()
            .matches(|customer| customer.points == 0 && customer.visits == 1);
        // This would cause the number of points to go to -1
        let res = database.apply_delta(PHONE, delta(3, -1)).await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, directory::Error::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_append_assigns_seq() {
        let database = MemoryDatabase::default();

        let first = database.append(accrual(Utc::now(), 3, "m1")).await.unwrap();
        let second = database.append(accrual(Utc::now(), 4, "m2")).await.unwrap();

        assert_that!(first.seq).is_equal_to(1_u64);
        assert_that!(second.seq).is_equal_to(2_u64);
        let res = database.entries_since(PHONE, 1).await;
        assert_that!(res)
            .is_ok()
            .matches(|entries| entries.len() == 1 && entries[0].message_id == "m2");
    }

    #[tokio::test]
    async fn test_append_duplicate_message() {
        let database = MemoryDatabase::default();
        database.append(accrual(Utc::now(), 3, "m1")).await.unwrap();

        let res = database.append(accrual(Utc::now(), 7, "m1")).await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, ledger::Error::DuplicateMessage { existing } if existing.delta_points == 3)
        });
        assert_that!(database.entries_since(PHONE, 0).await)
            .is_ok()
            .has_length(1);
        assert_that!(database.find_by_message("m1").await)
            .is_ok()
            .is_some()
            .matches(|entry| entry.seq == 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_sum_accrual_today(timezone: Tz) {
        // GIVEN
        // * an accrual at 23:30 local time the previous day
        // * two accruals and a redemption during the business day
        // * an accrual for another customer
        let database = MemoryDatabase::default();
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let yesterday_late = Utc.with_ymd_and_hms(2024, 3, 9, 21, 30, 0).unwrap();
        let today_early = Utc.with_ymd_and_hms(2024, 3, 9, 22, 30, 0).unwrap();
        let today_late = Utc.with_ymd_and_hms(2024, 3, 10, 21, 0, 0).unwrap();
        database.append(accrual(yesterday_late, 5, "m1")).await.unwrap();
        database.append(accrual(today_early, 2, "m2")).await.unwrap();
        database.append(accrual(today_late, 3, "m3")).await.unwrap();
        database
            .append(LedgerEntry::redemption(
                PHONE,
                today_late,
                4,
                &RedemptionCode::generate(),
                "m4",
            ))
            .await
            .unwrap();
        database
            .append(LedgerEntry::accrual(
                "other",
                today_late,
                6,
                Decimal::from(300),
                None,
                "m5",
            ))
            .await
            .unwrap();

        // WHEN summing the accruals of the business day
        let res = database.sum_accrual_today(PHONE, day, timezone).await;

        // THEN only that customer's accruals during the local day count
        assert_that!(res).is_ok().is_equal_to(5_u64);
    }

    #[rstest]
    #[tokio::test]
    async fn test_sum_accrual_today_daylight_saving(timezone: Tz) {
        // GIVEN accruals around local midnight while Cairo is on UTC+3
        // * 20:30 UTC is 23:30 on July 9th
        // * 21:30 UTC is 00:30 on July 10th
        let database = MemoryDatabase::default();
        let day = NaiveDate::from_ymd_opt(2024, 7, 10).unwrap();
        let before_midnight = Utc.with_ymd_and_hms(2024, 7, 9, 20, 30, 0).unwrap();
        let after_midnight = Utc.with_ymd_and_hms(2024, 7, 9, 21, 30, 0).unwrap();
        database.append(accrual(before_midnight, 4, "m1")).await.unwrap();
        database.append(accrual(after_midnight, 3, "m2")).await.unwrap();

        // WHEN summing the accruals of July 10th
        let res = database.sum_accrual_today(PHONE, day, timezone).await;

        // THEN the business day follows the summer offset
        assert_that!(res).is_ok().is_equal_to(3_u64);
    }
}
