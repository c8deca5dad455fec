use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::domain::LedgerEntry;

#[mockall::automock]
#[async_trait::async_trait]
pub trait LedgerPort {
    /// Persist an entry and return it with its sequence number
    ///
    /// Fails with [`Error::DuplicateMessage`] if an entry already exists for the same source
    /// message.
    async fn append(&self, entry: LedgerEntry) -> Result<LedgerEntry, Error>;

    async fn find_by_message(&self, message_id: &str) -> Result<Option<LedgerEntry>, Error>;

    /// Sum of the accrued points of a customer during a business day
    ///
    /// The business day is evaluated in the given timezone.
    async fn sum_accrual_today(
        &self,
        phone: &str,
        business_day: NaiveDate,
        timezone: Tz,
    ) -> Result<u64, Error>;

    /// Entries of a customer with a sequence number above `after_seq`, oldest first
    ///
    /// Passing `0` returns the whole history of the customer.
    async fn entries_since(&self, phone: &str, after_seq: u64) -> Result<Vec<LedgerEntry>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An entry was already recorded for this message
    ///
    /// The upstream channel may deliver the same message more than once. The recorded entry is
    /// returned so that callers can replay its result.
    #[error("message {} was already processed", .existing.message_id)]
    DuplicateMessage { existing: Box<LedgerEntry> },

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
