//! Per-customer store credit account.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{CreditKind, CreditTransaction, Customer};
use crate::services::clock::Clock;
use crate::services::metrics::CREDIT_OPERATIONS;
use crate::services::repository::CustomerStore;
use crate::services::status::round_money;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub const DEFAULT_REMOVAL_DESCRIPTION: &str = "credit used";

#[derive(Clone)]
pub struct CreditAccount {
    customers: Arc<dyn CustomerStore>,
    clock: Arc<dyn Clock>,
}

impl CreditAccount {
    pub fn new(customers: Arc<dyn CustomerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { customers, clock }
    }

    fn positive_amount(amount: Decimal) -> LedgerResult<Decimal> {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation("credit amount must be greater than zero"));
        }
        Ok(amount)
    }

    async fn apply(
        &self,
        customer_id: Uuid,
        kind: CreditKind,
        amount: Decimal,
        description: String,
    ) -> LedgerResult<Customer> {
        let transaction = CreditTransaction {
            transaction_id: Uuid::new_v4(),
            customer_id,
            kind,
            amount,
            description,
            created_utc: self.clock.now(),
        };

        let customer = self.customers.apply_credit(&transaction).await?;

        CREDIT_OPERATIONS.with_label_values(&[kind.as_str()]).inc();
        info!(
            customer_id = %customer_id,
            kind = %kind,
            amount = %amount,
            credit_balance = %customer.credit_balance,
            "Store credit moved"
        );

        Ok(customer)
    }

    #[instrument(skip(self, description), fields(customer_id = %customer_id, amount = %amount))]
    pub async fn add_credit(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        description: impl Into<String>,
    ) -> LedgerResult<Customer> {
        let amount = Self::positive_amount(amount)?;
        let description = description.into();
        if description.trim().is_empty() {
            return Err(LedgerError::validation("credit description must not be empty"));
        }
        self.apply(customer_id, CreditKind::Add, amount, description)
            .await
    }

    /// Fails with `InsufficientBalance` when `amount` exceeds the balance;
    /// nothing is written in that case.
    #[instrument(skip(self, description), fields(customer_id = %customer_id, amount = %amount))]
    pub async fn remove_credit(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> LedgerResult<Customer> {
        let amount = Self::positive_amount(amount)?;
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REMOVAL_DESCRIPTION.to_string());
        self.apply(customer_id, CreditKind::Remove, amount, description)
            .await
    }

    pub async fn customer(&self, customer_id: Uuid) -> LedgerResult<Customer> {
        self.customers
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("customer", customer_id))
    }

    pub async fn balance(&self, customer_id: Uuid) -> LedgerResult<Decimal> {
        Ok(self.customer(customer_id).await?.credit_balance)
    }

    /// Oldest first.
    pub async fn history(&self, customer_id: Uuid) -> LedgerResult<Vec<CreditTransaction>> {
        self.customer(customer_id).await?;
        self.customers.credit_transactions(customer_id).await
    }
}
