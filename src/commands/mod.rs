use std::{borrow::Cow, sync::Arc};

use chrono_tz::Tz;
use rust_decimal::Decimal;
use tracing::warn;

use crate::{
    domain::{Customer, EntryKind, LedgerEntry, SettingsError},
    locks::CustomerLocks,
    ports::{
        catalog::{self, CatalogPort},
        directory::{self, DirectoryPort, PointsDelta},
        ledger::{self, LedgerPort},
        settings::{self, SettingsPort},
    },
};

pub mod accrue;
pub mod query;
pub mod redeem;

/// Entry point of the loyalty engines
///
/// `D` is the row store holding customers and the ledger, `S` the settings table, and `C` the
/// reward catalog.
pub struct DomainLogic<D, S, C> {
    database: Arc<D>,
    settings: Arc<S>,
    catalog: Arc<C>,
    locks: CustomerLocks,
    /// Timezone in which business days are evaluated
    timezone: Tz,
}

impl<D, S, C> DomainLogic<D, S, C> {
    pub fn new(database: Arc<D>, settings: Arc<S>, catalog: Arc<C>, timezone: Tz) -> Self {
        Self {
            database,
            settings,
            catalog,
            locks: CustomerLocks::new(),
            timezone,
        }
    }
}

impl<D, S, C> Clone for DomainLogic<D, S, C> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            settings: self.settings.clone(),
            catalog: self.catalog.clone(),
            locks: self.locks.clone(),
            timezone: self.timezone,
        }
    }
}

impl<D, S, C> DomainLogic<D, S, C>
where
    D: DirectoryPort + LedgerPort + Send + Sync + 'static,
    S: SettingsPort + Send + Sync + 'static,
    C: CatalogPort + Send + Sync + 'static,
{
    /// Record the first interaction of a customer
    pub async fn register(&self, phone: &str, name: &str) -> Result<Customer, Error> {
        Ok(self.database.get_or_create(phone, name).await?)
    }

    /// Bring the customer aggregate up to date with the ledger
    ///
    /// Entries appended without reaching the aggregate, e.g. after a storage failure, are folded
    /// in here. Must be called with the customer lock held.
    async fn sync_customer(&self, phone: &str) -> Result<Customer, Error> {
        let mut customer = self.database.get_or_create(phone, "").await?;
        let pending = self
            .database
            .entries_since(phone, customer.applied_seq)
            .await?;

        for entry in pending {
            warn!(
                phone,
                seq = entry.seq,
                "ledger entry missing from customer aggregate, applying it"
            );
            customer = self
                .database
                .apply_delta(phone, delta_for(&entry))
                .await?;
        }

        Ok(customer)
    }
}

/// Aggregate change for a ledger entry
fn delta_for(entry: &LedgerEntry) -> PointsDelta {
    PointsDelta {
        seq: entry.seq,
        points: entry.delta_points,
        touches_visit: entry.kind == EntryKind::Accrual,
        invoice: match entry.kind {
            EntryKind::Accrual => entry.reference.clone(),
            EntryKind::Redemption => None,
        },
        at: entry.at,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(Cow<'static, str>),
    #[error("presented code does not match today's code")]
    InvalidCode,
    #[error("bill of {bill} is below the minimum of {minimum}")]
    BelowMinimum { bill: Decimal, minimum: Decimal },
    #[error("daily cap of {cap} points reached")]
    DailyCapReached { cap: u64 },
    #[error("unknown reward {0}")]
    UnknownReward(String),
    #[error("insufficient balance: {balance} points for a cost of {cost}")]
    InsufficientBalance { balance: u64, cost: u64 },

    #[error("settings are misconfigured: {0}")]
    Misconfigured(#[from] SettingsError),
    /// Transient failure of the row store
    ///
    /// Nothing was recorded for the message, so a redelivery can retry it.
    #[error("storage unavailable: {0:?}")]
    StorageUnavailable(Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid state: {0}")]
    InvalidState(Cow<'static, str>),
}

impl From<directory::Error> for Error {
    fn from(err: directory::Error) -> Self {
        match err {
            directory::Error::InsufficientBalance {
                current_points,
                delta_points,
            } => Self::InsufficientBalance {
                balance: current_points,
                cost: delta_points.unsigned_abs(),
            },
            err @ directory::Error::PointsOverflow { .. } => {
                Self::InvalidState(err.to_string().into())
            }
            directory::Error::Adapter(err) => Self::StorageUnavailable(err),
        }
    }
}

impl From<ledger::Error> for Error {
    fn from(err: ledger::Error) -> Self {
        match err {
            ledger::Error::DuplicateMessage { existing } => Self::InvalidState(
                format!("message {} was already processed", existing.message_id).into(),
            ),
            ledger::Error::Adapter(err) => Self::StorageUnavailable(err),
        }
    }
}

impl From<settings::Error> for Error {
    fn from(err: settings::Error) -> Self {
        match err {
            settings::Error::Invalid(err) => Self::Misconfigured(err),
            settings::Error::Adapter(err) => Self::StorageUnavailable(err),
        }
    }
}

impl From<catalog::Error> for Error {
    fn from(err: catalog::Error) -> Self {
        match err {
            catalog::Error::Adapter(err) => Self::StorageUnavailable(err),
        }
    }
}
