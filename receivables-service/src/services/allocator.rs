//! Oldest-first distribution of mixed-method payments across a customer's
//! open receivables.
//!
//! Every payment is its own committed write, awaited before the next one is
//! issued, and each write continues from the record the store returned. A
//! failure part way through leaves earlier payments in place and is reported
//! through the saga journal rather than rolled back.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Payment, PaymentMethod, Receivable};
use crate::services::clock::Clock;
use crate::services::credit::CreditAccount;
use crate::services::metrics::PAYMENTS_RECORDED;
use crate::services::repository::ReceivableStore;
use crate::services::saga::{SagaAction, SagaKind, SagaReport};
use crate::services::status::{recompute, round_money};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What happens to money left over once every open receivable is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverpaymentPolicy {
    /// Return it as `unapplied_amount` and let the operator decide.
    #[default]
    Report,
    /// Refuse the whole allocation before writing anything.
    Reject,
    /// Move it to the customer's store credit.
    Credit,
}

impl FromStr for OverpaymentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "reject" => Ok(Self::Reject),
            "credit" => Ok(Self::Credit),
            other => Err(format!("unknown overpayment policy '{}'", other)),
        }
    }
}

/// Amount tendered per payment method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSplit {
    #[serde(default)]
    pub cash: Decimal,
    #[serde(default)]
    pub pix: Decimal,
    #[serde(default)]
    pub card: Decimal,
}

impl PaymentSplit {
    pub fn cash(amount: Decimal) -> Self {
        Self {
            cash: amount,
            ..Self::default()
        }
    }

    pub fn amount(&self, method: PaymentMethod) -> Decimal {
        match method {
            PaymentMethod::Cash => self.cash,
            PaymentMethod::Pix => self.pix,
            PaymentMethod::Card => self.card,
        }
    }

    fn amount_mut(&mut self, method: PaymentMethod) -> &mut Decimal {
        match method {
            PaymentMethod::Cash => &mut self.cash,
            PaymentMethod::Pix => &mut self.pix,
            PaymentMethod::Card => &mut self.card,
        }
    }

    pub fn total(&self) -> Decimal {
        self.cash + self.pix + self.card
    }

    fn rounded(&self) -> Self {
        Self {
            cash: round_money(self.cash),
            pix: round_money(self.pix),
            card: round_money(self.card),
        }
    }

    fn validate(&self) -> LedgerResult<()> {
        for method in PaymentMethod::ALL {
            if self.amount(method) < Decimal::ZERO {
                return Err(LedgerError::validation(format!(
                    "{} amount must not be negative",
                    method
                )));
            }
        }
        if self.total() <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "at least one payment amount must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// One payment written by an allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub receivable_id: Uuid,
    pub payment_id: Uuid,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub remaining_after: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub customer_id: Uuid,
    pub applied: Vec<Allocation>,
    /// Left over after every open receivable was settled.
    pub unapplied_amount: Decimal,
    pub unapplied_by_method: PaymentSplit,
    /// Part of the leftover moved to store credit under the credit policy.
    pub credited_amount: Decimal,
    pub report: SagaReport,
}

impl AllocationOutcome {
    pub fn applied_total(&self) -> Decimal {
        self.applied.iter().map(|a| a.amount).sum()
    }
}

#[derive(Clone)]
pub struct PaymentAllocator {
    receivables: Arc<dyn ReceivableStore>,
    credit: CreditAccount,
    clock: Arc<dyn Clock>,
    policy: OverpaymentPolicy,
}

impl PaymentAllocator {
    pub fn new(
        receivables: Arc<dyn ReceivableStore>,
        credit: CreditAccount,
        clock: Arc<dyn Clock>,
        policy: OverpaymentPolicy,
    ) -> Self {
        Self {
            receivables,
            credit,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> OverpaymentPolicy {
        self.policy
    }

    pub fn new_payment(
        &self,
        amount: Decimal,
        method: PaymentMethod,
        payment_date: NaiveDate,
        notes: Option<String>,
    ) -> Payment {
        Payment {
            payment_id: Uuid::new_v4(),
            amount,
            method,
            payment_date,
            notes,
            recorded_utc: self.clock.now(),
        }
    }

    /// Append one payment to `receivable` and persist it. The payment may
    /// not exceed what is still owed.
    #[instrument(skip(self, receivable, payment), fields(receivable_id = %receivable.receivable_id, amount = %payment.amount, method = %payment.method))]
    pub async fn apply(&self, receivable: &Receivable, payment: Payment) -> LedgerResult<Receivable> {
        if payment.amount <= Decimal::ZERO {
            return Err(LedgerError::validation("payment amount must be greater than zero"));
        }
        if payment.amount > receivable.remaining_amount {
            return Err(LedgerError::validation(format!(
                "payment of {} exceeds the remaining balance of {}",
                payment.amount, receivable.remaining_amount
            )));
        }

        let previous_paid_amount = receivable.paid_amount;
        let method = payment.method;
        let mut next = receivable.clone();
        next.paid_amount = round_money(previous_paid_amount + payment.amount);
        next.payments.push(payment);
        recompute(&mut next);

        let saved = self
            .receivables
            .record_payment(&next, previous_paid_amount)
            .await?;

        PAYMENTS_RECORDED.with_label_values(&[method.as_str()]).inc();

        Ok(saved)
    }

    #[instrument(skip(self, split, notes), fields(customer_id = %customer_id, offered = %split.total()))]
    pub async fn allocate(
        &self,
        customer_id: Uuid,
        split: PaymentSplit,
        payment_date: NaiveDate,
        notes: Option<String>,
    ) -> LedgerResult<AllocationOutcome> {
        let split = split.rounded();
        split.validate()?;
        self.credit.customer(customer_id).await?;

        let mut open: Vec<Receivable> = self
            .receivables
            .list(Some(customer_id))
            .await?
            .into_iter()
            .filter(|r| r.status.is_open())
            .collect();

        if self.policy == OverpaymentPolicy::Reject {
            let outstanding: Decimal = open.iter().map(|r| r.remaining_amount).sum();
            if split.total() > outstanding {
                return Err(LedgerError::Overpayment {
                    offered: split.total(),
                    outstanding,
                });
            }
        }

        let mut report = SagaReport::new(SagaKind::Allocation, customer_id);
        let mut applied = Vec::new();
        let mut left = split;

        for (index, method) in PaymentMethod::ALL.into_iter().enumerate() {
            for slot in open.iter_mut() {
                let method_left = left.amount(method);
                if method_left.is_zero() {
                    break;
                }
                if slot.remaining_amount <= Decimal::ZERO {
                    continue;
                }

                let amount = slot.remaining_amount.min(method_left);
                let payment = self.new_payment(amount, method, payment_date, notes.clone());
                let payment_id = payment.payment_id;
                let step = SagaAction::ApplyPayment {
                    receivable_id: slot.receivable_id,
                    payment_id,
                    method,
                    amount,
                };

                match self.apply(slot, payment).await {
                    Ok(saved) => {
                        report.committed(step);
                        applied.push(Allocation {
                            receivable_id: saved.receivable_id,
                            payment_id,
                            method,
                            amount,
                            remaining_after: saved.remaining_amount,
                        });
                        *left.amount_mut(method) -= amount;
                        *slot = saved;
                    }
                    Err(e) => {
                        warn!(
                            receivable_id = %slot.receivable_id,
                            error = %e,
                            "Allocation write failed"
                        );
                        report.failed(step, e.to_string());
                        for pending in &PaymentMethod::ALL[index..] {
                            let amount = left.amount(*pending);
                            if amount > Decimal::ZERO {
                                report.pending(SagaAction::AllocateRemainder {
                                    customer_id,
                                    method: *pending,
                                    amount,
                                });
                            }
                        }
                        return Err(if report.committed_count() == 0 {
                            e
                        } else {
                            LedgerError::interrupted(report, e)
                        });
                    }
                }
            }
        }

        let unapplied_amount = left.total();
        let mut credited_amount = Decimal::ZERO;

        if unapplied_amount > Decimal::ZERO {
            match self.policy {
                OverpaymentPolicy::Credit => {
                    let description = format!("overpayment {}", payment_date);
                    let step = SagaAction::AddCredit {
                        customer_id,
                        amount: unapplied_amount,
                        description: description.clone(),
                    };
                    match self
                        .credit
                        .add_credit(customer_id, unapplied_amount, description)
                        .await
                    {
                        Ok(_) => {
                            report.committed(step);
                            credited_amount = unapplied_amount;
                        }
                        Err(e) => {
                            report.failed(step, e.to_string());
                            return Err(if report.committed_count() == 0 {
                                e
                            } else {
                                LedgerError::interrupted(report, e)
                            });
                        }
                    }
                }
                OverpaymentPolicy::Report | OverpaymentPolicy::Reject => {
                    warn!(
                        customer_id = %customer_id,
                        unapplied_amount = %unapplied_amount,
                        "Payment exceeds outstanding balance, leftover not applied"
                    );
                }
            }
        }

        info!(
            customer_id = %customer_id,
            payments = applied.len(),
            unapplied_amount = %unapplied_amount,
            credited_amount = %credited_amount,
            "Payment allocated"
        );

        Ok(AllocationOutcome {
            customer_id,
            applied,
            unapplied_amount,
            unapplied_by_method: left,
            credited_amount,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parses() {
        assert_eq!("Credit".parse::<OverpaymentPolicy>().unwrap(), OverpaymentPolicy::Credit);
        assert_eq!(" report ".parse::<OverpaymentPolicy>().unwrap(), OverpaymentPolicy::Report);
        assert!("refund".parse::<OverpaymentPolicy>().is_err());
    }

    #[test]
    fn test_split_validation() {
        assert!(PaymentSplit::default().validate().is_err());
        let negative = PaymentSplit {
            cash: Decimal::from(10),
            pix: Decimal::from(-1),
            card: Decimal::ZERO,
        };
        assert!(negative.validate().is_err());
        assert!(PaymentSplit::cash(Decimal::from(1)).validate().is_ok());
    }
}
