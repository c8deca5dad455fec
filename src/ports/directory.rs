use chrono::{DateTime, Utc};

use crate::domain::Customer;

#[mockall::automock]
#[async_trait::async_trait]
pub trait DirectoryPort {
    /// Return the customer for this phone number, creating it on first contact
    ///
    /// A non-empty `name` is recorded if the customer doesn't have one yet.
    async fn get_or_create(&self, phone: &str, name: &str) -> Result<Customer, Error>;

    /// Fold a ledger entry into the customer aggregate
    ///
    /// Deltas whose `seq` was already applied are ignored and the current aggregate is returned,
    /// so replaying an entry is safe.
    async fn apply_delta(&self, phone: &str, delta: PointsDelta) -> Result<Customer, Error>;
}

/// Change to apply to a customer aggregate, derived from a ledger entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointsDelta {
    /// Sequence number of the ledger entry
    pub seq: u64,
    pub points: i64,
    /// Count this movement as a visit
    pub touches_visit: bool,
    pub invoice: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Trying to remove too many loyalty points
    ///
    /// This would result in a negative number of loyalty points, which is not supported.
    #[error("trying to subtract too many points: {delta_points} from {current_points}")]
    InsufficientBalance {
        current_points: u64,
        delta_points: i64,
    },

    /// The new balance doesn't fit the aggregate
    #[error("adding {delta_points} points to {current_points} overflows the balance")]
    PointsOverflow {
        current_points: u64,
        delta_points: i64,
    },

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
