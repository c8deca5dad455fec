//! Parser for the free-text commands customers send over the messaging channel.
//!
//! Keywords are matched case-insensitively after trimming. Arguments keep their case.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::trace;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Points,
    Rewards,
    Redeem {
        reward_id: String,
    },
    Add {
        bill: Decimal,
        code: String,
        invoice: Option<String>,
    },
    /// Known command with missing or malformed arguments
    Usage(Usage),
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Usage {
    Add,
    Redeem,
}

pub fn parse(raw: &str) -> Command {
    let mut words = raw.split_whitespace();
    let Some(keyword) = words.next() else {
        return Command::Unknown;
    };
    let args: Vec<&str> = words.collect();

    let command = if keyword.eq_ignore_ascii_case("start") && args.is_empty() {
        Command::Start
    } else if keyword.eq_ignore_ascii_case("points") && args.is_empty() {
        Command::Points
    } else if keyword.eq_ignore_ascii_case("rewards") && args.is_empty() {
        Command::Rewards
    } else if keyword.eq_ignore_ascii_case("redeem") {
        match args.as_slice() {
            [reward_id] => Command::Redeem {
                reward_id: reward_id.to_string(),
            },
            _ => Command::Usage(Usage::Redeem),
        }
    } else if keyword.eq_ignore_ascii_case("add") {
        parse_add(&args)
    } else {
        Command::Unknown
    };
    trace!(?command, "parsed inbound text");

    command
}

/// `add <amount> <code> [invoice]`
fn parse_add(args: &[&str]) -> Command {
    let (amount, code, invoice) = match args {
        [amount, code] => (amount, code, None),
        [amount, code, invoice] => (amount, code, Some(invoice.to_string())),
        _ => return Command::Usage(Usage::Add),
    };

    match Decimal::from_str(amount) {
        Ok(bill) => Command::Add {
            bill,
            code: code.to_string(),
            invoice,
        },
        Err(_) => Command::Usage(Usage::Add),
    }
}
