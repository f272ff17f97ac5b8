//! Receivable and payment models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Settlement status, always derived from `total_amount` and `paid_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReceivableStatus {
    Pending,
    Partial,
    Paid,
}

impl ReceivableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Paid)
    }
}

impl std::fmt::Display for ReceivableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a payment was settled at the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Pix,
    Card,
}

impl PaymentMethod {
    /// Order in which a mixed payment is allocated.
    pub const ALL: [PaymentMethod; 3] = [Self::Cash, Self::Pix, Self::Card];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Pix => "pix",
            Self::Card => "card",
        }
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self::Cash
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One settlement event against a receivable. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
    pub recorded_utc: DateTime<Utc>,
}

/// One purchase owed by one customer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Receivable {
    pub receivable_id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub status: ReceivableStatus,
    #[sqlx(json)]
    pub payments: Vec<Payment>,
    pub due_date: NaiveDate,
    pub warranty_period_days: i32,
    pub archived: bool,
    pub sold_on_credit: bool,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

impl Receivable {
    pub fn is_deleted(&self) -> bool {
        self.deleted_utc.is_some()
    }

    pub fn has_payments(&self) -> bool {
        !self.payments.is_empty()
    }

    /// Sum of the embedded payment list.
    pub fn payments_total(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount).sum()
    }

    /// Overdue means still owing after the due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.due_date < today
    }
}

/// Input for recording a credit sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReceivable {
    pub customer_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub warranty_period_days: i32,
    pub notes: Option<String>,
}

/// Partial edit. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReceivable {
    pub product_name: Option<String>,
    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    pub warranty_period_days: Option<i32>,
    pub notes: Option<String>,
}

impl UpdateReceivable {
    /// True when the edit touches a field that is frozen once money was collected.
    pub fn touches_locked_fields(&self) -> bool {
        self.product_name.is_some()
            || self.cost_price.is_some()
            || self.sale_price.is_some()
            || self.total_amount.is_some()
    }
}

/// Input for a single payment against a known receivable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayment {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
}
