//! Customer-level handlers: allocation, debt summary and store credit.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{AddCreditRequest, AllocatePaymentRequest, CreditAccountResponse, RemoveCreditRequest};
use crate::models::{Customer, CustomerSummary};
use crate::services::AllocationOutcome;
use crate::startup::AppState;
use service_core::error::AppError;

/// Spread a mixed-method payment over the customer's open receivables.
///
/// POST /customers/:customer_id/allocations
pub async fn allocate_payment(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<AllocatePaymentRequest>,
) -> Result<Json<AllocationOutcome>, AppError> {
    req.validate()?;
    let payment_date = req.payment_date.unwrap_or_else(|| state.ledger.today());
    let outcome = state
        .ledger
        .allocate_payment(customer_id, req.split(), payment_date, req.notes)
        .await?;
    Ok(Json(outcome))
}

/// GET /customers/:customer_id/summary
pub async fn customer_summary(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<CustomerSummary>, AppError> {
    Ok(Json(state.ledger.customer_summary(customer_id).await?))
}

/// Balance plus history, oldest first.
///
/// GET /customers/:customer_id/credit
pub async fn get_credit(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<CreditAccountResponse>, AppError> {
    let credit_balance = state.ledger.credit_balance(customer_id).await?;
    let transactions = state.ledger.credit_history(customer_id).await?;
    Ok(Json(CreditAccountResponse {
        customer_id,
        credit_balance,
        transactions,
    }))
}

/// POST /customers/:customer_id/credit
pub async fn add_credit(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<AddCreditRequest>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    req.validate()?;
    let customer = state
        .ledger
        .add_credit(customer_id, req.amount, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

/// POST /customers/:customer_id/credit/withdrawals
pub async fn remove_credit(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(req): Json<RemoveCreditRequest>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    req.validate()?;
    let customer = state
        .ledger
        .remove_credit(customer_id, req.amount, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(customer)))
}
