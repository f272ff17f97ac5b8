//! Receivable handlers.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    AddPaymentRequest, ArchiveRequest, CreateReceivableRequest, ListQuery, RefundRequest,
    UpdateReceivableRequest,
};
use crate::models::{NewPayment, Receivable};
use crate::services::{RefundDecision, RefundOutcome, ReceivableView};
use crate::startup::AppState;
use service_core::error::AppError;

/// Record a credit sale.
///
/// POST /receivables
pub async fn create_receivable(
    State(state): State<AppState>,
    Json(req): Json<CreateReceivableRequest>,
) -> Result<(StatusCode, Json<Receivable>), AppError> {
    req.validate()?;
    let receivable = state.ledger.create_receivable(req.into()).await?;
    Ok((StatusCode::CREATED, Json(receivable)))
}

/// GET /receivables?customer_id=&view=active|archived|all
pub async fn list_receivables(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReceivableView>>, AppError> {
    let rows = state.ledger.list(query.customer_id, query.view).await?;
    Ok(Json(rows))
}

/// GET /receivables/:receivable_id
pub async fn get_receivable(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
) -> Result<Json<Receivable>, AppError> {
    Ok(Json(state.ledger.get_receivable(receivable_id).await?))
}

/// PATCH /receivables/:receivable_id
pub async fn update_receivable(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
    Json(req): Json<UpdateReceivableRequest>,
) -> Result<Json<Receivable>, AppError> {
    req.validate()?;
    let receivable = state
        .ledger
        .update_receivable(receivable_id, req.into())
        .await?;
    Ok(Json(receivable))
}

/// Permanent delete.
///
/// DELETE /receivables/:receivable_id
pub async fn purge_receivable(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.ledger.purge_receivable(receivable_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /receivables/:receivable_id/payments
pub async fn add_payment(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
    Json(req): Json<AddPaymentRequest>,
) -> Result<(StatusCode, Json<Receivable>), AppError> {
    req.validate()?;
    let payment = NewPayment {
        amount: req.amount,
        method: req.method,
        payment_date: req.payment_date.unwrap_or_else(|| state.ledger.today()),
        notes: req.notes,
    };
    let receivable = state.ledger.add_payment(receivable_id, payment).await?;
    Ok((StatusCode::CREATED, Json(receivable)))
}

/// What the operator must decide before refunding.
///
/// GET /receivables/:receivable_id/refund
pub async fn refund_decision(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
) -> Result<Json<RefundDecision>, AppError> {
    Ok(Json(state.ledger.refund_decision(receivable_id).await?))
}

/// POST /receivables/:receivable_id/refund
pub async fn refund_receivable(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<RefundOutcome>, AppError> {
    let outcome = state
        .ledger
        .refund_receivable(receivable_id, req.keep_as_credit)
        .await?;
    Ok(Json(outcome))
}

/// POST /receivables/:receivable_id/restore
pub async fn restore_receivable(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
) -> Result<Json<Receivable>, AppError> {
    Ok(Json(state.ledger.restore_receivable(receivable_id).await?))
}

/// PUT /receivables/:receivable_id/archived
pub async fn set_archived(
    State(state): State<AppState>,
    Path(receivable_id): Path<Uuid>,
    Json(req): Json<ArchiveRequest>,
) -> Result<Json<Receivable>, AppError> {
    let receivable = state
        .ledger
        .set_archived(receivable_id, req.archived)
        .await?;
    Ok(Json(receivable))
}
