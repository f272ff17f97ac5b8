//! Refunds: turning a receivable back into store credit or cash, returning
//! the product to stock and soft-deleting the debt.

use crate::error::{LedgerError, LedgerResult};
use crate::models::Receivable;
use crate::services::catalog::{BuyerInfo, CatalogClient};
use crate::services::credit::CreditAccount;
use crate::services::metrics::REFUNDS_TOTAL;
use crate::services::repository::ReceivableStore;
use crate::services::saga::{SagaAction, SagaKind, SagaReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What the operator has to decide before a refund can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RefundDecision {
    /// Nothing was paid, a plain confirmation is enough.
    ConfirmDelete,
    /// Money was collected: keep it as store credit or hand it back in cash.
    ChooseCreditOrCash { paid_amount: Decimal },
}

impl RefundDecision {
    pub fn for_receivable(receivable: &Receivable) -> Self {
        if receivable.paid_amount > Decimal::ZERO {
            Self::ChooseCreditOrCash {
                paid_amount: receivable.paid_amount,
            }
        } else {
            Self::ConfirmDelete
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub receivable_id: Uuid,
    pub customer_id: Uuid,
    pub credited_amount: Decimal,
    /// Paid amount handed back outside the ledger.
    pub cash_refund_amount: Decimal,
    pub restocked: bool,
    pub report: SagaReport,
}

#[derive(Clone)]
pub struct RefundEngine {
    receivables: Arc<dyn ReceivableStore>,
    credit: CreditAccount,
    catalog: Arc<dyn CatalogClient>,
}

impl RefundEngine {
    pub fn new(
        receivables: Arc<dyn ReceivableStore>,
        credit: CreditAccount,
        catalog: Arc<dyn CatalogClient>,
    ) -> Self {
        Self {
            receivables,
            credit,
            catalog,
        }
    }

    async fn load(&self, receivable_id: Uuid) -> LedgerResult<Receivable> {
        self.receivables
            .get(receivable_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("receivable", receivable_id))
    }

    pub async fn decision(&self, receivable_id: Uuid) -> LedgerResult<RefundDecision> {
        let receivable = self.load(receivable_id).await?;
        Ok(RefundDecision::for_receivable(&receivable))
    }

    /// Steps run in order: credit, restock, soft delete. A restock failure is
    /// recorded and does not stop the soft delete.
    #[instrument(skip(self), fields(receivable_id = %receivable_id, keep_as_credit = keep_as_credit))]
    pub async fn refund(&self, receivable_id: Uuid, keep_as_credit: bool) -> LedgerResult<RefundOutcome> {
        let receivable = self.load(receivable_id).await?;
        let mut report = SagaReport::new(SagaKind::Refund, receivable_id);
        let paid = receivable.paid_amount;

        let mut credited_amount = Decimal::ZERO;
        if paid > Decimal::ZERO && keep_as_credit {
            let description = format!("refund: {}", receivable.product_name);
            self.credit
                .add_credit(receivable.customer_id, paid, description.clone())
                .await?;
            report.committed(SagaAction::AddCredit {
                customer_id: receivable.customer_id,
                amount: paid,
                description,
            });
            credited_amount = paid;
        }

        let mut restocked = false;
        if let (Some(product_id), true) = (receivable.product_id, receivable.sold_on_credit) {
            let step = SagaAction::CancelCatalogSale {
                product_id,
                receivable_id,
                amount: receivable.total_amount,
            };
            if !self.catalog.is_enabled() {
                report.skipped(step, "catalog not configured");
            } else {
                match self.catalog.cancel_sale(product_id).await {
                    Ok(()) => {
                        report.committed(step);
                        restocked = true;
                    }
                    Err(e) => {
                        warn!(
                            product_id = %product_id,
                            error = %e,
                            "Restock failed, continuing refund"
                        );
                        report.failed(step, e.to_string());
                    }
                }
            }
        }

        let step = SagaAction::SoftDelete { receivable_id };
        let deleted = match self.receivables.soft_delete(receivable_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(LedgerError::not_found("receivable", receivable_id)),
            Err(e) => Err(e),
        };
        if let Err(e) = deleted {
            report.failed(step, e.to_string());
            return Err(if report.committed_count() == 0 {
                e
            } else {
                LedgerError::interrupted(report, e)
            });
        }
        report.committed(step);

        let cash_refund_amount = if keep_as_credit { Decimal::ZERO } else { paid };
        let kind = if credited_amount > Decimal::ZERO {
            "credit"
        } else if cash_refund_amount > Decimal::ZERO {
            "cash"
        } else {
            "none"
        };
        REFUNDS_TOTAL.with_label_values(&[kind]).inc();

        info!(
            receivable_id = %receivable_id,
            customer_id = %receivable.customer_id,
            credited_amount = %credited_amount,
            cash_refund_amount = %cash_refund_amount,
            restocked = restocked,
            "Receivable refunded"
        );

        Ok(RefundOutcome {
            receivable_id,
            customer_id: receivable.customer_id,
            credited_amount,
            cash_refund_amount,
            restocked,
            report,
        })
    }

    /// Undo the committed steps of `report`, newest first, under the saga id
    /// `compensation_id`. Every inverse is attempted even when an earlier one
    /// fails. Payments are never undone.
    #[instrument(skip(self, report), fields(saga_id = %report.saga_id, kind = %report.kind))]
    pub async fn compensate(&self, report: &SagaReport, compensation_id: Uuid) -> LedgerResult<SagaReport> {
        if report.kind == SagaKind::Compensation {
            return Err(LedgerError::validation(
                "a compensation report cannot itself be compensated",
            ));
        }

        let mut undo = SagaReport::new(SagaKind::Compensation, report.subject_id);
        undo.saga_id = compensation_id;
        for action in report.compensations() {
            match self.run(&action).await {
                Ok(Some(reason)) => undo.skipped(action, reason),
                Ok(None) => undo.committed(action),
                Err(e) => {
                    warn!(error = %e, "Compensation step failed");
                    undo.failed(action, e.to_string());
                }
            }
        }

        info!(
            saga_id = %report.saga_id,
            committed = undo.committed_count(),
            failed = undo.has_failures(),
            "Compensation finished"
        );

        Ok(undo)
    }

    /// `Ok(Some(reason))` means the step had nothing to do.
    async fn run(&self, action: &SagaAction) -> LedgerResult<Option<&'static str>> {
        match action {
            SagaAction::AddCredit {
                customer_id,
                amount,
                description,
            } => {
                self.credit
                    .add_credit(*customer_id, *amount, description.clone())
                    .await?;
                Ok(None)
            }
            SagaAction::RemoveCredit {
                customer_id,
                amount,
                description,
            } => {
                self.credit
                    .remove_credit(*customer_id, *amount, Some(description.clone()))
                    .await?;
                Ok(None)
            }
            SagaAction::Restore { receivable_id } => {
                if self.receivables.restore(*receivable_id).await? {
                    Ok(None)
                } else {
                    Ok(Some("receivable already live"))
                }
            }
            SagaAction::SoftDelete { receivable_id } => {
                if self.receivables.soft_delete(*receivable_id).await? {
                    Ok(None)
                } else {
                    Ok(Some("receivable already deleted"))
                }
            }
            SagaAction::CancelCatalogSale { product_id, .. } => {
                if !self.catalog.is_enabled() {
                    return Ok(Some("catalog not configured"));
                }
                self.catalog.cancel_sale(*product_id).await?;
                Ok(None)
            }
            SagaAction::MarkSoldOnCredit {
                product_id,
                receivable_id,
                amount,
            } => {
                if !self.catalog.is_enabled() {
                    return Ok(Some("catalog not configured"));
                }
                let receivable = self
                    .receivables
                    .get_any(*receivable_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("receivable", *receivable_id))?;
                let customer = self.credit.customer(receivable.customer_id).await?;
                let buyer = BuyerInfo {
                    name: customer.name,
                    phone: customer.phone,
                };
                self.catalog
                    .mark_sold_on_credit(*product_id, &buyer, *amount, *receivable_id)
                    .await?;
                Ok(None)
            }
            SagaAction::ApplyPayment { .. } | SagaAction::AllocateRemainder { .. } => {
                Ok(Some("payments are not compensated"))
            }
        }
    }
}
