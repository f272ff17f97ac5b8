//! Request and response bodies for the HTTP surface.
//!
//! Money travels as decimal strings. Shape checks live here; the ledger
//! enforces the money rules.

use crate::models::{CreateReceivable, CreditTransaction, PaymentMethod, UpdateReceivable};
use crate::services::{PaymentSplit, View};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReceivableRequest {
    pub customer_id: Uuid,
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "product_name must be 1-200 characters"))]
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
    #[validate(range(min = 0, message = "warranty_period_days must not be negative"))]
    pub warranty_period_days: i32,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl From<CreateReceivableRequest> for CreateReceivable {
    fn from(req: CreateReceivableRequest) -> Self {
        Self {
            customer_id: req.customer_id,
            product_id: req.product_id,
            product_name: req.product_name,
            cost_price: req.cost_price,
            sale_price: req.sale_price,
            total_amount: req.total_amount,
            paid_amount: req.paid_amount,
            payment_method: req.payment_method,
            due_date: req.due_date,
            warranty_period_days: req.warranty_period_days,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateReceivableRequest {
    #[validate(length(min = 1, max = 200, message = "product_name must be 1-200 characters"))]
    pub product_name: Option<String>,
    pub cost_price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub due_date: Option<NaiveDate>,
    #[validate(range(min = 0, message = "warranty_period_days must not be negative"))]
    pub warranty_period_days: Option<i32>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl From<UpdateReceivableRequest> for UpdateReceivable {
    fn from(req: UpdateReceivableRequest) -> Self {
        Self {
            product_name: req.product_name,
            cost_price: req.cost_price,
            sale_price: req.sale_price,
            total_amount: req.total_amount,
            due_date: req.due_date,
            warranty_period_days: req.warranty_period_days,
            notes: req.notes,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddPaymentRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub method: PaymentMethod,
    /// Defaults to today.
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AllocatePaymentRequest {
    #[serde(default)]
    pub cash: Decimal,
    #[serde(default)]
    pub pix: Decimal,
    #[serde(default)]
    pub card: Decimal,
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl AllocatePaymentRequest {
    pub fn split(&self) -> PaymentSplit {
        PaymentSplit {
            cash: self.cash,
            pix: self.pix,
            card: self.card,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub keep_as_credit: bool,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub view: View,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddCreditRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 200, message = "description must be 1-200 characters"))]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemoveCreditRequest {
    pub amount: Decimal,
    #[validate(length(max = 200))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreditAccountResponse {
    pub customer_id: Uuid,
    pub credit_balance: Decimal,
    pub transactions: Vec<CreditTransaction>,
}
