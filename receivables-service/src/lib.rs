//! Receivables Service - installment debts, mixed-method payment allocation
//! and per-customer store credit.

pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use error::{LedgerError, LedgerResult};
pub use startup::AppState;
