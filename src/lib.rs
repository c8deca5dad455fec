//! Customer loyalty ledger: points accrual and reward redemption driven by text commands.

pub mod adapters;
pub mod commands;
pub mod config;
pub mod domain;
pub mod handler;
pub mod interpreter;
pub mod locks;
pub mod ports;
pub mod telemetry;
