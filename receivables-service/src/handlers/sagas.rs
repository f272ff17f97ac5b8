use axum::extract::{Json, Path, State};
use uuid::Uuid;

use crate::services::{SagaRecord, SagaReport};
use crate::startup::AppState;
use service_core::error::AppError;

/// A report issued by an allocation, refund or compensation.
///
/// GET /sagas/:saga_id
pub async fn get_saga(
    State(state): State<AppState>,
    Path(saga_id): Path<Uuid>,
) -> Result<Json<SagaRecord>, AppError> {
    Ok(Json(state.ledger.saga(saga_id).await?))
}

/// Undo the committed steps of a stored report. Each report can be
/// compensated once.
///
/// POST /sagas/:saga_id/compensate
pub async fn compensate(
    State(state): State<AppState>,
    Path(saga_id): Path<Uuid>,
) -> Result<Json<SagaReport>, AppError> {
    Ok(Json(state.ledger.compensate(saga_id).await?))
}
