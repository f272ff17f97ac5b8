//! Step journal for multi-step ledger operations.
//!
//! Allocation across several receivables and refunds are sequences of
//! independently committed writes. Each operation keeps a `SagaReport`
//! listing what was committed, what failed and what never ran, so a caller
//! can resume the remainder or undo the committed part.

use crate::models::PaymentMethod;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaKind {
    Allocation,
    Refund,
    Compensation,
}

impl SagaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::Refund => "refund",
            Self::Compensation => "compensation",
        }
    }
}

impl std::fmt::Display for SagaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single write performed (or planned) by a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SagaAction {
    ApplyPayment {
        receivable_id: Uuid,
        payment_id: Uuid,
        method: PaymentMethod,
        amount: Decimal,
    },
    /// Part of an allocation that was never written.
    AllocateRemainder {
        customer_id: Uuid,
        method: PaymentMethod,
        amount: Decimal,
    },
    AddCredit {
        customer_id: Uuid,
        amount: Decimal,
        description: String,
    },
    RemoveCredit {
        customer_id: Uuid,
        amount: Decimal,
        description: String,
    },
    CancelCatalogSale {
        product_id: Uuid,
        receivable_id: Uuid,
        amount: Decimal,
    },
    MarkSoldOnCredit {
        product_id: Uuid,
        receivable_id: Uuid,
        amount: Decimal,
    },
    SoftDelete {
        receivable_id: Uuid,
    },
    Restore {
        receivable_id: Uuid,
    },
}

impl SagaAction {
    /// The action that undoes this one, if any. Payments are immutable and
    /// have no inverse.
    pub fn inverse(&self) -> Option<SagaAction> {
        match self {
            Self::ApplyPayment { .. } | Self::AllocateRemainder { .. } => None,
            Self::AddCredit {
                customer_id,
                amount,
                description,
            } => Some(Self::RemoveCredit {
                customer_id: *customer_id,
                amount: *amount,
                description: format!("reversal of {}", description),
            }),
            Self::RemoveCredit {
                customer_id,
                amount,
                description,
            } => Some(Self::AddCredit {
                customer_id: *customer_id,
                amount: *amount,
                description: format!("reversal of {}", description),
            }),
            Self::CancelCatalogSale {
                product_id,
                receivable_id,
                amount,
            } => Some(Self::MarkSoldOnCredit {
                product_id: *product_id,
                receivable_id: *receivable_id,
                amount: *amount,
            }),
            Self::MarkSoldOnCredit {
                product_id,
                receivable_id,
                amount,
            } => Some(Self::CancelCatalogSale {
                product_id: *product_id,
                receivable_id: *receivable_id,
                amount: *amount,
            }),
            Self::SoftDelete { receivable_id } => Some(Self::Restore {
                receivable_id: *receivable_id,
            }),
            Self::Restore { receivable_id } => Some(Self::SoftDelete {
                receivable_id: *receivable_id,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepStatus {
    Committed,
    Failed { reason: String },
    Skipped { reason: String },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStep {
    pub action: SagaAction,
    pub status: StepStatus,
    pub recorded_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaReport {
    pub saga_id: Uuid,
    pub kind: SagaKind,
    /// Customer for allocations, receivable for refunds.
    pub subject_id: Uuid,
    pub steps: Vec<SagaStep>,
}

impl SagaReport {
    pub fn new(kind: SagaKind, subject_id: Uuid) -> Self {
        Self {
            saga_id: Uuid::new_v4(),
            kind,
            subject_id,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, action: SagaAction, status: StepStatus) {
        self.steps.push(SagaStep {
            action,
            status,
            recorded_utc: Utc::now(),
        });
    }

    pub fn committed(&mut self, action: SagaAction) {
        self.push(action, StepStatus::Committed);
    }

    pub fn failed(&mut self, action: SagaAction, reason: impl Into<String>) {
        self.push(
            action,
            StepStatus::Failed {
                reason: reason.into(),
            },
        );
    }

    pub fn skipped(&mut self, action: SagaAction, reason: impl Into<String>) {
        self.push(
            action,
            StepStatus::Skipped {
                reason: reason.into(),
            },
        );
    }

    pub fn pending(&mut self, action: SagaAction) {
        self.push(action, StepStatus::Pending);
    }

    pub fn committed_count(&self) -> usize {
        self.committed_actions().count()
    }

    pub fn committed_actions(&self) -> impl Iterator<Item = &SagaAction> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Committed)
            .map(|s| &s.action)
    }

    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|s| matches!(s.status, StepStatus::Failed { .. }))
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &SagaAction> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| &s.action)
    }

    /// Inverses of the committed steps, most recent first.
    pub fn compensations(&self) -> Vec<SagaAction> {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.status == StepStatus::Committed)
            .filter_map(|s| s.action.inverse())
            .collect()
    }
}

/// An issued report as kept in the saga journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaRecord {
    pub report: SagaReport,
    /// Saga id of the compensation that undid this report.
    pub compensated_by: Option<Uuid>,
    pub recorded_utc: DateTime<Utc>,
}

impl SagaRecord {
    pub fn new(report: SagaReport) -> Self {
        Self {
            report,
            compensated_by: None,
            recorded_utc: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compensations_reverse_committed_steps_only() {
        let customer_id = Uuid::new_v4();
        let receivable_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();
        let mut report = SagaReport::new(SagaKind::Refund, receivable_id);
        report.committed(SagaAction::AddCredit {
            customer_id,
            amount: Decimal::from(80),
            description: "refund: Phone".to_string(),
        });
        report.failed(
            SagaAction::CancelCatalogSale {
                product_id,
                receivable_id,
                amount: Decimal::from(100),
            },
            "catalog offline",
        );
        report.committed(SagaAction::SoftDelete { receivable_id });

        let undo = report.compensations();
        assert_eq!(undo.len(), 2);
        assert_eq!(undo[0], SagaAction::Restore { receivable_id });
        assert!(matches!(
            &undo[1],
            SagaAction::RemoveCredit { amount, .. } if *amount == Decimal::from(80)
        ));
        assert!(report.has_failures());
        assert_eq!(report.committed_count(), 2);
    }

    #[test]
    fn test_payments_have_no_inverse() {
        let action = SagaAction::ApplyPayment {
            receivable_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
            method: PaymentMethod::Pix,
            amount: Decimal::from(5),
        };
        assert!(action.inverse().is_none());
    }

    #[test]
    fn test_report_serializes_with_tags() {
        let mut report = SagaReport::new(SagaKind::Allocation, Uuid::new_v4());
        report.pending(SagaAction::AllocateRemainder {
            customer_id: report.subject_id,
            method: PaymentMethod::Card,
            amount: Decimal::from(30),
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "allocation");
        assert_eq!(json["steps"][0]["action"]["action"], "allocate_remainder");
        assert_eq!(json["steps"][0]["status"]["state"], "pending");
        assert_eq!(report.pending_actions().count(), 1);
    }
}
