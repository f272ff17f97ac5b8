//! Persistence seams for the ledger.

use crate::error::LedgerResult;
use crate::models::{CreditTransaction, Customer, Receivable};
use crate::services::saga::{SagaRecord, SagaReport};
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

#[async_trait]
pub trait ReceivableStore: Send + Sync {
    async fn insert(&self, receivable: &Receivable) -> LedgerResult<Receivable>;

    /// Live (not soft-deleted) receivable.
    async fn get(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>>;

    /// Receivable regardless of soft-delete state.
    async fn get_any(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>>;

    /// Live receivables, oldest first (`created_utc`, then id).
    async fn list(&self, customer_id: Option<Uuid>) -> LedgerResult<Vec<Receivable>>;

    /// Persist field edits and derived fields. Payments and `paid_amount`
    /// are never written. Fails with `Conflict` unless the stored
    /// `paid_amount` still equals `receivable.paid_amount`, so an edit
    /// computed from a snapshot cannot land on top of a newer payment.
    async fn save(&self, receivable: &Receivable) -> LedgerResult<Receivable>;

    /// Persist a receivable whose payment list grew by exactly one entry.
    /// Fails with `Conflict` unless the stored `paid_amount` still equals
    /// `previous_paid_amount`.
    async fn record_payment(
        &self,
        receivable: &Receivable,
        previous_paid_amount: Decimal,
    ) -> LedgerResult<Receivable>;

    async fn soft_delete(&self, receivable_id: Uuid) -> LedgerResult<bool>;

    async fn restore(&self, receivable_id: Uuid) -> LedgerResult<bool>;

    /// Permanent delete, payment history included.
    async fn purge(&self, receivable_id: Uuid) -> LedgerResult<bool>;

    async fn health_check(&self) -> LedgerResult<()>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get_customer(&self, customer_id: Uuid) -> LedgerResult<Option<Customer>>;

    /// Apply one credit movement to the balance and append it to the
    /// history in a single commit. A removal larger than the balance fails
    /// with `InsufficientBalance` and writes nothing.
    async fn apply_credit(&self, transaction: &CreditTransaction) -> LedgerResult<Customer>;

    /// Credit history, oldest first.
    async fn credit_transactions(&self, customer_id: Uuid) -> LedgerResult<Vec<CreditTransaction>>;
}

/// Journal of every saga report the ledger has issued, keyed by `saga_id`.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Insert or replace the stored report. The compensation marker is kept.
    async fn record_saga(&self, report: &SagaReport) -> LedgerResult<()>;

    async fn get_saga(&self, saga_id: Uuid) -> LedgerResult<Option<SagaRecord>>;

    /// Mark `saga_id` as compensated by `compensation_id`. Returns false when
    /// it was already marked.
    async fn claim_compensation(&self, saga_id: Uuid, compensation_id: Uuid) -> LedgerResult<bool>;
}
