use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

mod settings;

pub use settings::{Settings, SettingsError};

/// Loyalty data about a customer
///
/// This is a cached projection of the ledger: `points` must always equal the sum of the
/// customer's ledger entries up to `applied_seq`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Customer {
    /// Phone number of the customer
    ///
    /// This is the identity key and is never reused.
    pub phone: String,
    /// Display name reported by the messaging channel on first contact
    pub name: String,
    /// Current amount of loyalty points
    pub points: u64,
    pub tier: Tier,
    /// Number of qualifying purchases
    pub visits: u32,
    /// Invoice reference of the last accrual, if the staff provided one
    pub last_invoice: Option<String>,
    /// Sequence number of the last ledger entry folded into this aggregate
    pub applied_seq: u64,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(phone: impl Into<String>, name: impl Into<String>, tiers: &TierThresholds) -> Self {
        Self {
            phone: phone.into(),
            name: name.into(),
            points: 0,
            tier: tiers.tier_for(0),
            visits: 0,
            last_invoice: None,
            applied_seq: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
        })
    }
}

/// Balance thresholds for the tier classifier
///
/// A balance below `silver` is Bronze, below `gold` is Silver, and anything else is Gold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub silver: u64,
    pub gold: u64,
}

impl TierThresholds {
    pub fn tier_for(&self, balance: u64) -> Tier {
        if balance >= self.gold {
            Tier::Gold
        } else if balance >= self.silver {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            silver: 20,
            gold: 50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Accrual,
    Redemption,
}

/// Immutable record of a point movement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub phone: String,
    /// Per-customer sequence number, assigned by the ledger on append
    pub seq: u64,
    pub at: DateTime<Utc>,
    /// Difference in points
    ///
    /// A positive number adds points to the current total. A negative number removes from it.
    pub delta_points: i64,
    /// Bill amount for accruals, zero for redemptions
    pub amount: Decimal,
    /// Invoice number for accruals, redemption code for redemptions
    pub reference: Option<String>,
    /// Identifier of the inbound message that caused this entry
    pub message_id: String,
    pub kind: EntryKind,
}

impl LedgerEntry {
    pub fn accrual(
        phone: impl Into<String>,
        at: DateTime<Utc>,
        points: u64,
        amount: Decimal,
        invoice: Option<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            phone: phone.into(),
            seq: 0,
            at,
            delta_points: signed(points),
            amount,
            reference: invoice,
            message_id: message_id.into(),
            kind: EntryKind::Accrual,
        }
    }

    pub fn redemption(
        phone: impl Into<String>,
        at: DateTime<Utc>,
        cost: u64,
        code: &RedemptionCode,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            phone: phone.into(),
            seq: 0,
            at,
            delta_points: -signed(cost),
            amount: Decimal::ZERO,
            reference: Some(code.to_string()),
            message_id: message_id.into(),
            kind: EntryKind::Redemption,
        }
    }
}

/// Point amounts are bounded by the daily cap and reward costs, both validated to fit an `i64`
fn signed(points: u64) -> i64 {
    i64::try_from(points).unwrap_or(i64::MAX)
}

/// Redeemable item from the reward catalog
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    /// Point cost, always positive
    pub cost: u64,
    #[serde(default)]
    pub description: String,
}

/// Single-use 6-digit code handed to the customer on redemption
///
/// Staff verify the code out-of-band; its expiry and consumption are not tracked here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionCode(String);

impl RedemptionCode {
    pub fn generate() -> Self {
        // thread_rng is a CSPRNG seeded from the OS
        let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Self(format!("{value:06}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RedemptionCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RedemptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    #[rstest]
    #[case(0, Tier::Bronze)]
    #[case(19, Tier::Bronze)]
    #[case(20, Tier::Silver)]
    #[case(49, Tier::Silver)]
    #[case(50, Tier::Gold)]
    #[case(5000, Tier::Gold)]
    fn test_tier_for_default(#[case] balance: u64, #[case] expected: Tier) {
        assert_that!(TierThresholds::default().tier_for(balance)).is_equal_to(expected);
    }

    #[test]
    fn test_tier_for_retuned() {
        // GIVEN thresholds retuned by an operator
        let tiers = TierThresholds {
            silver: 100,
            gold: 300,
        };

        // THEN the boundaries move with them
        assert_that!(tiers.tier_for(99)).is_equal_to(Tier::Bronze);
        assert_that!(tiers.tier_for(100)).is_equal_to(Tier::Silver);
        assert_that!(tiers.tier_for(300)).is_equal_to(Tier::Gold);
    }

    #[test]
    fn test_new_customer() {
        let customer = Customer::new("201000000000", "Mona", &TierThresholds::default());

        assert_that!(customer.points).is_equal_to(0_u64);
        assert_that!(customer.visits).is_equal_to(0_u32);
        assert_that!(customer.tier).is_equal_to(Tier::Bronze);
        assert_that!(customer.applied_seq).is_equal_to(0_u64);
    }

    #[test]
    fn test_redemption_code_format() {
        for _ in 0..100 {
            let code = RedemptionCode::generate();
            assert_that!(code.as_str().len()).is_equal_to(6_usize);
            assert_that!(code.as_str().chars().all(|c| c.is_ascii_digit())).is_true();
        }
    }

    #[test]
    fn test_redemption_entry_is_negative() {
        let code = RedemptionCode::from("123456".to_string());
        let entry = LedgerEntry::redemption("2010", Utc::now(), 30, &code, "wamid.1");

        assert_that!(entry.delta_points).is_equal_to(-30_i64);
        assert_that!(entry.amount).is_equal_to(Decimal::ZERO);
        assert_that!(entry.reference).is_equal_to(Some("123456".to_string()));
        assert_that!(entry.kind).is_equal_to(EntryKind::Redemption);
    }
}
