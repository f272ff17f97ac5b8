//! Customer credit account models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Customer as seen by the ledger. Rows are owned by the customer CRUD;
/// only `credit_balance` is written here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub credit_balance: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Direction of a credit movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CreditKind {
    Add,
    Remove,
}

impl CreditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }

    /// Signed effect of `amount` on the balance.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Add => amount,
            Self::Remove => -amount,
        }
    }
}

impl std::fmt::Display for CreditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record of a credit balance change.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub transaction_id: Uuid,
    pub customer_id: Uuid,
    pub kind: CreditKind,
    pub amount: Decimal,
    pub description: String,
    pub created_utc: DateTime<Utc>,
}

/// Aggregated debt position of one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub customer_id: Uuid,
    pub total_owed: Decimal,
    pub open_count: usize,
    pub overdue_count: usize,
    pub overdue_amount: Decimal,
    pub credit_balance: Decimal,
}
