//! Ledger error taxonomy and its mapping onto HTTP errors.

use crate::services::saga::SagaReport;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Rejected before any write.
    #[error("{0}")]
    Validation(String),

    #[error("insufficient credit balance for customer {customer_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        customer_id: Uuid,
        available: Decimal,
        requested: Decimal,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("receivable {id} is locked: {reason}")]
    Locked { id: Uuid, reason: &'static str },

    /// Optimistic guard on payment writes tripped.
    #[error("receivable {0} was modified concurrently, reload and retry")]
    Conflict(Uuid),

    #[error("saga {0} was already compensated")]
    AlreadyCompensated(Uuid),

    #[error("payment of {offered} exceeds the {outstanding} currently owed")]
    Overpayment {
        offered: Decimal,
        outstanding: Decimal,
    },

    #[error("catalog collaborator failed: {0}")]
    Catalog(String),

    #[error("persistence failure: {0}")]
    Persistence(anyhow::Error),

    /// A multi-step operation failed after committing some of its steps.
    #[error("{} interrupted after {} committed step(s): {source}", .report.kind, .report.committed_count())]
    Interrupted {
        report: Box<SagaReport>,
        #[source]
        source: Box<LedgerError>,
    },
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn interrupted(report: SagaReport, source: LedgerError) -> Self {
        Self::Interrupted {
            report: Box::new(report),
            source: Box::new(source),
        }
    }

    /// Low-cardinality label for the error counter.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NotFound { .. } => "not_found",
            Self::Locked { .. } => "locked",
            Self::Conflict(_) => "conflict",
            Self::AlreadyCompensated(_) => "already_compensated",
            Self::Overpayment { .. } => "overpayment",
            Self::Catalog(_) => "catalog",
            Self::Persistence(_) => "persistence",
            Self::Interrupted { .. } => "interrupted",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            e @ LedgerError::Overpayment { .. } => AppError::BadRequest(anyhow::anyhow!(e.to_string())),
            e @ LedgerError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(e.to_string())),
            e @ (LedgerError::Locked { .. }
            | LedgerError::Conflict(_)
            | LedgerError::AlreadyCompensated(_)) => {
                AppError::Conflict(anyhow::anyhow!(e.to_string()))
            }
            e @ LedgerError::InsufficientBalance { .. } => {
                AppError::Unprocessable(anyhow::anyhow!(e.to_string()))
            }
            LedgerError::Catalog(msg) => AppError::BadGateway(msg),
            LedgerError::Persistence(e) => AppError::DatabaseError(e),
            LedgerError::Interrupted { report, source } => {
                let message = format!(
                    "{} interrupted after {} committed step(s): {}",
                    report.kind,
                    report.committed_count(),
                    source
                );
                let completed = serde_json::to_value(&*report).unwrap_or_default();
                AppError::PartiallyApplied { message, completed }
            }
        }
    }
}
