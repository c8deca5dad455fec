//! Today's operating parameters, parsed from the settings rows of the row store.

use rust_decimal::{prelude::ToPrimitive, Decimal};
use std::str::FromStr;

pub const EGP_PER_POINT_KEY: &str = "EGP_PER_POINT";
pub const MIN_BILL_KEY: &str = "MIN_BILL";
pub const DAILY_CAP_KEY: &str = "DAILY_CAP";
pub const DAILY_CODE_KEY: &str = "DAILY_CODE";

/// Typed snapshot of the settings table
///
/// This is read fresh for every operation since the daily code rotates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Bill amount (EGP) needed for a single point, always positive
    pub egp_per_point: Decimal,
    /// Minimum bill amount that qualifies for points
    pub min_bill: Decimal,
    /// Maximum number of points a customer can accrue per business day, at most `i64::MAX`
    pub daily_cap: u64,
    /// Code staff give to the customer at the till
    ///
    /// `None` means no code has been configured yet and every accrual is rejected.
    pub daily_code: Option<String>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid value for setting {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            egp_per_point: Decimal::from(50),
            min_bill: Decimal::ZERO,
            daily_cap: 8,
            daily_code: None,
        }
    }
}

impl Settings {
    /// Build settings from key/value rows
    ///
    /// Keys are matched case-insensitively. Missing keys fall back to the defaults, unknown
    /// keys are ignored, and blank values count as missing.
    pub fn from_rows<'a, I>(rows: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Settings::default();

        for (key, value) in rows {
            let key = key.trim();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            if key.eq_ignore_ascii_case(EGP_PER_POINT_KEY) {
                settings.egp_per_point = parse_decimal(value)
                    .filter(|rate| rate.is_sign_positive() && !rate.is_zero())
                    .ok_or_else(|| invalid(EGP_PER_POINT_KEY, value))?;
            } else if key.eq_ignore_ascii_case(MIN_BILL_KEY) {
                settings.min_bill = parse_decimal(value)
                    .filter(|min| !min.is_sign_negative())
                    .ok_or_else(|| invalid(MIN_BILL_KEY, value))?;
            } else if key.eq_ignore_ascii_case(DAILY_CAP_KEY) {
                settings.daily_cap = value
                    .parse::<u64>()
                    .ok()
                    .filter(|cap| *cap > 0 && i64::try_from(*cap).is_ok())
                    .ok_or_else(|| invalid(DAILY_CAP_KEY, value))?;
            } else if key.eq_ignore_ascii_case(DAILY_CODE_KEY) {
                settings.daily_code = Some(value.to_string());
            }
        }

        Ok(settings)
    }

    /// Raw points for a bill: `floor(bill / egp_per_point)`
    ///
    /// The bill must be positive.
    pub fn points_for(&self, bill: Decimal) -> u64 {
        bill.checked_div(self.egp_per_point)
            .map(|points| points.floor())
            .and_then(|points| points.to_u64())
            .unwrap_or(u64::MAX)
    }

    /// Whether the code presented by the customer is today's code
    pub fn accepts_code(&self, presented: &str) -> bool {
        match &self.daily_code {
            Some(code) => code.eq_ignore_ascii_case(presented.trim()),
            None => false,
        }
    }
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value).ok()
}

fn invalid(key: &'static str, value: &str) -> SettingsError {
    SettingsError::Invalid {
        key,
        value: value.to_string(),
    }
}
