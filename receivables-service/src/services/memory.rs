//! In-process store used by tests and local runs without PostgreSQL.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{CreditTransaction, Customer, Receivable};
use crate::services::repository::{CustomerStore, ReceivableStore, SagaStore};
use crate::services::saga::{SagaRecord, SagaReport};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    receivables: RwLock<HashMap<Uuid, Receivable>>,
    customers: RwLock<HashMap<Uuid, Customer>>,
    credit_log: RwLock<Vec<CreditTransaction>>,
    sagas: RwLock<HashMap<Uuid, SagaRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a customer row (customer CRUD lives outside the ledger).
    pub async fn insert_customer(&self, customer: Customer) {
        self.customers
            .write()
            .await
            .insert(customer.customer_id, customer);
    }
}

#[async_trait]
impl ReceivableStore for InMemoryStore {
    async fn insert(&self, receivable: &Receivable) -> LedgerResult<Receivable> {
        let mut map = self.receivables.write().await;
        if map.contains_key(&receivable.receivable_id) {
            return Err(LedgerError::Persistence(anyhow::anyhow!(
                "Receivable {} already exists",
                receivable.receivable_id
            )));
        }
        map.insert(receivable.receivable_id, receivable.clone());
        Ok(receivable.clone())
    }

    async fn get(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>> {
        Ok(self
            .receivables
            .read()
            .await
            .get(&receivable_id)
            .filter(|r| !r.is_deleted())
            .cloned())
    }

    async fn get_any(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>> {
        Ok(self.receivables.read().await.get(&receivable_id).cloned())
    }

    async fn list(&self, customer_id: Option<Uuid>) -> LedgerResult<Vec<Receivable>> {
        let map = self.receivables.read().await;
        let mut rows: Vec<Receivable> = map
            .values()
            .filter(|r| !r.is_deleted())
            .filter(|r| customer_id.map_or(true, |c| r.customer_id == c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_utc
                .cmp(&b.created_utc)
                .then_with(|| a.receivable_id.cmp(&b.receivable_id))
        });
        Ok(rows)
    }

    async fn save(&self, receivable: &Receivable) -> LedgerResult<Receivable> {
        let mut map = self.receivables.write().await;
        let stored = map
            .get_mut(&receivable.receivable_id)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| LedgerError::not_found("receivable", receivable.receivable_id))?;

        if stored.paid_amount != receivable.paid_amount {
            return Err(LedgerError::Conflict(receivable.receivable_id));
        }

        let payments = std::mem::take(&mut stored.payments);
        let paid_amount = stored.paid_amount;
        *stored = receivable.clone();
        stored.payments = payments;
        stored.paid_amount = paid_amount;
        stored.updated_utc = Utc::now();
        Ok(stored.clone())
    }

    async fn record_payment(
        &self,
        receivable: &Receivable,
        previous_paid_amount: Decimal,
    ) -> LedgerResult<Receivable> {
        let mut map = self.receivables.write().await;
        let stored = map
            .get_mut(&receivable.receivable_id)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| LedgerError::not_found("receivable", receivable.receivable_id))?;

        if stored.paid_amount != previous_paid_amount {
            return Err(LedgerError::Conflict(receivable.receivable_id));
        }

        stored.payments = receivable.payments.clone();
        stored.paid_amount = receivable.paid_amount;
        stored.remaining_amount = receivable.remaining_amount;
        stored.status = receivable.status;
        stored.updated_utc = Utc::now();
        Ok(stored.clone())
    }

    async fn soft_delete(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        let mut map = self.receivables.write().await;
        match map.get_mut(&receivable_id) {
            Some(r) if !r.is_deleted() => {
                r.deleted_utc = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        let mut map = self.receivables.write().await;
        match map.get_mut(&receivable_id) {
            Some(r) if r.is_deleted() => {
                r.deleted_utc = None;
                r.updated_utc = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        Ok(self
            .receivables
            .write()
            .await
            .remove(&receivable_id)
            .is_some())
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn get_customer(&self, customer_id: Uuid) -> LedgerResult<Option<Customer>> {
        Ok(self.customers.read().await.get(&customer_id).cloned())
    }

    async fn apply_credit(&self, transaction: &CreditTransaction) -> LedgerResult<Customer> {
        // Both locks are held so balance and history move together.
        let mut customers = self.customers.write().await;
        let mut log = self.credit_log.write().await;

        let customer = customers
            .get_mut(&transaction.customer_id)
            .ok_or_else(|| LedgerError::not_found("customer", transaction.customer_id))?;

        let next = customer.credit_balance + transaction.kind.signed(transaction.amount);
        if next < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                customer_id: customer.customer_id,
                available: customer.credit_balance,
                requested: transaction.amount,
            });
        }

        customer.credit_balance = next;
        log.push(transaction.clone());
        Ok(customer.clone())
    }

    async fn credit_transactions(&self, customer_id: Uuid) -> LedgerResult<Vec<CreditTransaction>> {
        Ok(self
            .credit_log
            .read()
            .await
            .iter()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SagaStore for InMemoryStore {
    async fn record_saga(&self, report: &SagaReport) -> LedgerResult<()> {
        let mut sagas = self.sagas.write().await;
        match sagas.get_mut(&report.saga_id) {
            Some(record) => record.report = report.clone(),
            None => {
                sagas.insert(report.saga_id, SagaRecord::new(report.clone()));
            }
        }
        Ok(())
    }

    async fn get_saga(&self, saga_id: Uuid) -> LedgerResult<Option<SagaRecord>> {
        Ok(self.sagas.read().await.get(&saga_id).cloned())
    }

    async fn claim_compensation(&self, saga_id: Uuid, compensation_id: Uuid) -> LedgerResult<bool> {
        let mut sagas = self.sagas.write().await;
        let record = sagas
            .get_mut(&saga_id)
            .ok_or_else(|| LedgerError::not_found("saga", saga_id))?;
        if record.compensated_by.is_some() {
            return Ok(false);
        }
        record.compensated_by = Some(compensation_id);
        Ok(true)
    }
}
