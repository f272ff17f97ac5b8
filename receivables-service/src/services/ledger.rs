//! Receivables ledger: the operations exposed to callers.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    CreateReceivable, CreditTransaction, Customer, CustomerSummary, NewPayment, Receivable,
    ReceivableStatus, UpdateReceivable,
};
use crate::services::allocator::{AllocationOutcome, OverpaymentPolicy, PaymentAllocator, PaymentSplit};
use crate::services::archive::{visibility, View, Visibility};
use crate::services::cache::ReceivableCache;
use crate::services::catalog::{BuyerInfo, CatalogClient};
use crate::services::clock::Clock;
use crate::services::credit::CreditAccount;
use crate::services::metrics::{record_error, ALLOCATIONS_TOTAL, PAYMENTS_RECORDED};
use crate::services::refund::{RefundDecision, RefundEngine, RefundOutcome};
use crate::services::repository::{CustomerStore, ReceivableStore, SagaStore};
use crate::services::saga::{SagaKind, SagaRecord, SagaReport};
use crate::services::status::{recompute, round_money};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const MAX_PRODUCT_NAME_LEN: usize = 200;

/// A receivable with its read-time flags.
#[derive(Debug, Clone, Serialize)]
pub struct ReceivableView {
    #[serde(flatten)]
    pub receivable: Receivable,
    pub visibility: Visibility,
    pub overdue: bool,
}

fn track<T>(result: LedgerResult<T>) -> LedgerResult<T> {
    if let Err(e) = &result {
        record_error(e.error_type());
    }
    result
}

fn non_negative(field: &str, value: Option<Decimal>) -> LedgerResult<Option<Decimal>> {
    match value.map(round_money) {
        Some(v) if v < Decimal::ZERO => Err(LedgerError::validation(format!(
            "{} must not be negative",
            field
        ))),
        other => Ok(other),
    }
}

fn product_name(name: &str) -> LedgerResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("product_name is required"));
    }
    if name.chars().count() > MAX_PRODUCT_NAME_LEN {
        return Err(LedgerError::validation(format!(
            "product_name must be at most {} characters",
            MAX_PRODUCT_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn warranty_days(days: i32) -> LedgerResult<i32> {
    if days < 0 {
        return Err(LedgerError::validation("warranty_period_days must not be negative"));
    }
    Ok(days)
}

pub struct ReceivablesLedger {
    receivables: Arc<dyn ReceivableStore>,
    sagas: Arc<dyn SagaStore>,
    catalog: Arc<dyn CatalogClient>,
    clock: Arc<dyn Clock>,
    cache: ReceivableCache,
    credit: CreditAccount,
    allocator: PaymentAllocator,
    refunds: RefundEngine,
}

impl ReceivablesLedger {
    pub fn new(
        receivables: Arc<dyn ReceivableStore>,
        customers: Arc<dyn CustomerStore>,
        sagas: Arc<dyn SagaStore>,
        catalog: Arc<dyn CatalogClient>,
        clock: Arc<dyn Clock>,
        policy: OverpaymentPolicy,
        cache: ReceivableCache,
    ) -> Self {
        let credit = CreditAccount::new(customers, clock.clone());
        let allocator =
            PaymentAllocator::new(receivables.clone(), credit.clone(), clock.clone(), policy);
        let refunds = RefundEngine::new(receivables.clone(), credit.clone(), catalog.clone());

        Self {
            receivables,
            sagas,
            catalog,
            clock,
            cache,
            credit,
            allocator,
            refunds,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn overpayment_policy(&self) -> OverpaymentPolicy {
        self.allocator.policy()
    }

    pub async fn health_check(&self) -> LedgerResult<()> {
        self.receivables.health_check().await
    }

    async fn load(&self, receivable_id: Uuid) -> LedgerResult<Receivable> {
        self.receivables
            .get(receivable_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("receivable", receivable_id))
    }

    async fn customer_receivables(&self, customer_id: Uuid) -> LedgerResult<Vec<Receivable>> {
        if let Some(hit) = self.cache.get(&customer_id) {
            return Ok(hit);
        }
        let version = self.cache.version(&customer_id);
        let rows = self.receivables.list(Some(customer_id)).await?;
        self.cache.put(customer_id, rows.clone(), version);
        Ok(rows)
    }

    /// Record a credit sale. A positive initial `paid_amount` becomes the
    /// first payment.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn create_receivable(&self, input: CreateReceivable) -> LedgerResult<Receivable> {
        track(self.create_receivable_inner(input).await)
    }

    async fn create_receivable_inner(&self, input: CreateReceivable) -> LedgerResult<Receivable> {
        let product_name = product_name(&input.product_name)?;
        if input.product_id.is_some_and(|id| id.is_nil()) {
            return Err(LedgerError::validation("product_id must not be the nil id"));
        }
        let total_amount = round_money(input.total_amount);
        if total_amount <= Decimal::ZERO {
            return Err(LedgerError::validation("total_amount must be greater than zero"));
        }
        let paid_amount = round_money(input.paid_amount);
        if paid_amount < Decimal::ZERO {
            return Err(LedgerError::validation("paid_amount must not be negative"));
        }
        if paid_amount > total_amount {
            return Err(LedgerError::validation("paid_amount must not exceed total_amount"));
        }
        let cost_price = non_negative("cost_price", input.cost_price)?;
        let sale_price = non_negative("sale_price", input.sale_price)?;
        let warranty_period_days = warranty_days(input.warranty_period_days)?;

        let customer = self.credit.customer(input.customer_id).await?;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut payments = Vec::new();
        if paid_amount > Decimal::ZERO {
            payments.push(self.allocator.new_payment(
                paid_amount,
                input.payment_method,
                today,
                Some("down payment".to_string()),
            ));
        }

        let mut receivable = Receivable {
            receivable_id: Uuid::new_v4(),
            customer_id: customer.customer_id,
            product_id: input.product_id,
            product_name,
            cost_price,
            sale_price,
            total_amount,
            paid_amount,
            remaining_amount: total_amount,
            status: ReceivableStatus::Pending,
            payments,
            due_date: input.due_date.unwrap_or(today),
            warranty_period_days,
            archived: false,
            sold_on_credit: false,
            notes: input.notes,
            created_utc: now,
            updated_utc: now,
            deleted_utc: None,
        };
        recompute(&mut receivable);

        let mut receivable = self.receivables.insert(&receivable).await?;
        self.cache.invalidate(&receivable.customer_id);

        if paid_amount > Decimal::ZERO {
            PAYMENTS_RECORDED
                .with_label_values(&[input.payment_method.as_str()])
                .inc();
        }

        if let (Some(product_id), true) = (receivable.product_id, self.catalog.is_enabled()) {
            let buyer = BuyerInfo {
                name: customer.name.clone(),
                phone: customer.phone.clone(),
            };
            match self
                .catalog
                .mark_sold_on_credit(product_id, &buyer, total_amount, receivable.receivable_id)
                .await
            {
                Ok(()) => {
                    receivable = self.flag_sold_on_credit(receivable).await?;
                    self.cache.invalidate(&receivable.customer_id);
                }
                Err(e) => {
                    warn!(
                        receivable_id = %receivable.receivable_id,
                        product_id = %product_id,
                        error = %e,
                        "Catalog did not acknowledge credit sale"
                    );
                }
            }
        }

        info!(
            receivable_id = %receivable.receivable_id,
            total_amount = %receivable.total_amount,
            status = %receivable.status,
            "Receivable recorded"
        );

        Ok(receivable)
    }

    /// A payment may land between the insert and this write; retry once on
    /// a fresh copy in that case.
    async fn flag_sold_on_credit(&self, mut receivable: Receivable) -> LedgerResult<Receivable> {
        receivable.sold_on_credit = true;
        match self.receivables.save(&receivable).await {
            Err(LedgerError::Conflict(_)) => {
                let mut fresh = self.load(receivable.receivable_id).await?;
                fresh.sold_on_credit = true;
                self.receivables.save(&fresh).await
            }
            other => other,
        }
    }

    pub async fn get_receivable(&self, receivable_id: Uuid) -> LedgerResult<Receivable> {
        track(self.load(receivable_id).await)
    }

    /// Single payment against one receivable.
    #[instrument(skip(self, payment), fields(receivable_id = %receivable_id, amount = %payment.amount))]
    pub async fn add_payment(&self, receivable_id: Uuid, payment: NewPayment) -> LedgerResult<Receivable> {
        track(self.add_payment_inner(receivable_id, payment).await)
    }

    async fn add_payment_inner(&self, receivable_id: Uuid, input: NewPayment) -> LedgerResult<Receivable> {
        let amount = round_money(input.amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation("payment amount must be greater than zero"));
        }
        let receivable = self.load(receivable_id).await?;
        let payment = self
            .allocator
            .new_payment(amount, input.method, input.payment_date, input.notes);

        let result = self.allocator.apply(&receivable, payment).await;
        self.cache.invalidate(&receivable.customer_id);
        let saved = result?;

        info!(
            receivable_id = %receivable_id,
            paid_amount = %saved.paid_amount,
            status = %saved.status,
            "Payment recorded"
        );
        Ok(saved)
    }

    /// Edit a receivable. Product and price fields are frozen once a payment exists.
    #[instrument(skip(self, edit), fields(receivable_id = %receivable_id))]
    pub async fn update_receivable(
        &self,
        receivable_id: Uuid,
        edit: UpdateReceivable,
    ) -> LedgerResult<Receivable> {
        track(self.update_receivable_inner(receivable_id, edit).await)
    }

    async fn update_receivable_inner(
        &self,
        receivable_id: Uuid,
        edit: UpdateReceivable,
    ) -> LedgerResult<Receivable> {
        let mut receivable = self.load(receivable_id).await?;

        if receivable.has_payments() && edit.touches_locked_fields() {
            return Err(LedgerError::Locked {
                id: receivable_id,
                reason: "payments already recorded; use a payment or a refund instead",
            });
        }

        if let Some(name) = edit.product_name {
            receivable.product_name = product_name(&name)?;
        }
        if edit.cost_price.is_some() {
            receivable.cost_price = non_negative("cost_price", edit.cost_price)?;
        }
        if edit.sale_price.is_some() {
            receivable.sale_price = non_negative("sale_price", edit.sale_price)?;
        }
        if let Some(days) = edit.warranty_period_days {
            receivable.warranty_period_days = warranty_days(days)?;
        }
        if let Some(due_date) = edit.due_date {
            receivable.due_date = due_date;
        }
        if edit.notes.is_some() {
            receivable.notes = edit.notes;
        }
        if let Some(total) = edit.total_amount {
            let total = round_money(total);
            if total <= Decimal::ZERO {
                return Err(LedgerError::validation("total_amount must be greater than zero"));
            }
            if total != receivable.total_amount {
                receivable.total_amount = total;
                recompute(&mut receivable);
            }
        }

        let saved = self.receivables.save(&receivable).await?;
        self.cache.invalidate(&saved.customer_id);

        info!(receivable_id = %receivable_id, "Receivable updated");
        Ok(saved)
    }

    /// Manual archive toggle, allowed for any status.
    #[instrument(skip(self), fields(receivable_id = %receivable_id))]
    pub async fn set_archived(&self, receivable_id: Uuid, archived: bool) -> LedgerResult<Receivable> {
        track(
            async {
                let mut receivable = self.load(receivable_id).await?;
                receivable.archived = archived;
                let saved = self.receivables.save(&receivable).await?;
                self.cache.invalidate(&saved.customer_id);
                info!(receivable_id = %receivable_id, archived = archived, "Archive flag set");
                Ok::<_, LedgerError>(saved)
            }
            .await,
        )
    }

    /// Undo a soft delete. Restoring a live receivable returns it unchanged.
    #[instrument(skip(self), fields(receivable_id = %receivable_id))]
    pub async fn restore_receivable(&self, receivable_id: Uuid) -> LedgerResult<Receivable> {
        track(
            async {
                let receivable = self
                    .receivables
                    .get_any(receivable_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("receivable", receivable_id))?;
                if receivable.is_deleted() {
                    self.receivables.restore(receivable_id).await?;
                    self.cache.invalidate(&receivable.customer_id);
                    info!(receivable_id = %receivable_id, "Receivable restored");
                }
                self.load(receivable_id).await
            }
            .await,
        )
    }

    /// Permanent delete. A receivable with payments must go through a
    /// refund (soft delete) first.
    #[instrument(skip(self), fields(receivable_id = %receivable_id))]
    pub async fn purge_receivable(&self, receivable_id: Uuid) -> LedgerResult<()> {
        track(
            async {
                let receivable = self
                    .receivables
                    .get_any(receivable_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("receivable", receivable_id))?;
                if receivable.has_payments() && !receivable.is_deleted() {
                    return Err(LedgerError::Locked {
                        id: receivable_id,
                        reason: "payments recorded; take the refund decision first",
                    });
                }
                if !self.receivables.purge(receivable_id).await? {
                    return Err(LedgerError::not_found("receivable", receivable_id));
                }
                self.cache.invalidate(&receivable.customer_id);
                info!(receivable_id = %receivable_id, "Receivable purged");
                Ok::<_, LedgerError>(())
            }
            .await,
        )
    }

    /// Receivables in `view`, oldest first, with visibility computed now.
    pub async fn list(&self, customer_id: Option<Uuid>, view: View) -> LedgerResult<Vec<ReceivableView>> {
        let rows = match customer_id {
            Some(customer_id) => self.customer_receivables(customer_id).await,
            None => self.receivables.list(None).await,
        };
        let rows = track(rows)?;

        let now = self.clock.now();
        let today = now.date_naive();
        Ok(rows
            .into_iter()
            .filter_map(|receivable| {
                let visibility = visibility(&receivable, now);
                view.includes(visibility).then(|| ReceivableView {
                    overdue: receivable.is_overdue(today),
                    visibility,
                    receivable,
                })
            })
            .collect())
    }

    pub async fn list_active(&self, customer_id: Option<Uuid>) -> LedgerResult<Vec<Receivable>> {
        Ok(self
            .list(customer_id, View::Active)
            .await?
            .into_iter()
            .map(|v| v.receivable)
            .collect())
    }

    pub async fn list_archived(&self, customer_id: Option<Uuid>) -> LedgerResult<Vec<Receivable>> {
        Ok(self
            .list(customer_id, View::Archived)
            .await?
            .into_iter()
            .map(|v| v.receivable)
            .collect())
    }

    /// Open debt position of one customer, archived records included.
    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn customer_summary(&self, customer_id: Uuid) -> LedgerResult<CustomerSummary> {
        track(
            async {
                let customer = self.credit.customer(customer_id).await?;
                let rows = self.customer_receivables(customer_id).await?;
                let today = self.clock.today();

                let mut summary = CustomerSummary {
                    customer_id,
                    total_owed: Decimal::ZERO,
                    open_count: 0,
                    overdue_count: 0,
                    overdue_amount: Decimal::ZERO,
                    credit_balance: customer.credit_balance,
                };
                for r in rows.iter().filter(|r| r.status.is_open()) {
                    summary.total_owed += r.remaining_amount;
                    summary.open_count += 1;
                    if r.is_overdue(today) {
                        summary.overdue_count += 1;
                        summary.overdue_amount += r.remaining_amount;
                    }
                }
                Ok::<_, LedgerError>(summary)
            }
            .await,
        )
    }

    /// Spread a mixed-method payment over the customer's open receivables,
    /// oldest first.
    pub async fn allocate_payment(
        &self,
        customer_id: Uuid,
        split: PaymentSplit,
        payment_date: NaiveDate,
        notes: Option<String>,
    ) -> LedgerResult<AllocationOutcome> {
        let result = self
            .allocator
            .allocate(customer_id, split, payment_date, notes)
            .await;
        self.cache.invalidate(&customer_id);
        match &result {
            Ok(outcome) => self.journal(&outcome.report).await,
            Err(LedgerError::Interrupted { report, .. }) => self.journal(report).await,
            Err(_) => {}
        }

        let outcome = match &result {
            Ok(o) if o.credited_amount > Decimal::ZERO => "credited",
            Ok(o) if o.unapplied_amount > Decimal::ZERO => "leftover",
            Ok(_) => "settled",
            Err(LedgerError::Interrupted { .. }) => "interrupted",
            Err(_) => "rejected",
        };
        ALLOCATIONS_TOTAL.with_label_values(&[outcome]).inc();

        track(result)
    }

    pub async fn refund_decision(&self, receivable_id: Uuid) -> LedgerResult<RefundDecision> {
        track(self.refunds.decision(receivable_id).await)
    }

    pub async fn refund_receivable(
        &self,
        receivable_id: Uuid,
        keep_as_credit: bool,
    ) -> LedgerResult<RefundOutcome> {
        let result = self.refunds.refund(receivable_id, keep_as_credit).await;
        match &result {
            Ok(outcome) => {
                self.cache.invalidate(&outcome.customer_id);
                self.journal(&outcome.report).await;
            }
            Err(e) => {
                self.cache.clear();
                if let LedgerError::Interrupted { report, .. } = e {
                    self.journal(report).await;
                }
            }
        }
        track(result)
    }

    /// Keep an issued report so it can later be compensated by id. The
    /// operation it describes has already committed, so a journal failure is
    /// logged and not returned.
    async fn journal(&self, report: &SagaReport) {
        if let Err(e) = self.sagas.record_saga(report).await {
            error!(
                saga_id = %report.saga_id,
                kind = %report.kind,
                error = %e,
                "Failed to record saga report"
            );
        }
    }

    pub async fn saga(&self, saga_id: Uuid) -> LedgerResult<SagaRecord> {
        track(
            self.sagas
                .get_saga(saga_id)
                .await
                .and_then(|record| record.ok_or_else(|| LedgerError::not_found("saga", saga_id))),
        )
    }

    /// Undo a report this ledger issued. Each report is compensated at most
    /// once; a second attempt fails with `AlreadyCompensated`.
    #[instrument(skip(self), fields(saga_id = %saga_id))]
    pub async fn compensate(&self, saga_id: Uuid) -> LedgerResult<SagaReport> {
        track(self.compensate_inner(saga_id).await)
    }

    async fn compensate_inner(&self, saga_id: Uuid) -> LedgerResult<SagaReport> {
        let record = self
            .sagas
            .get_saga(saga_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("saga", saga_id))?;
        if record.report.kind == SagaKind::Compensation {
            return Err(LedgerError::validation(
                "a compensation report cannot itself be compensated",
            ));
        }
        if record.compensated_by.is_some() {
            return Err(LedgerError::AlreadyCompensated(saga_id));
        }

        let compensation_id = Uuid::new_v4();
        if !self.sagas.claim_compensation(saga_id, compensation_id).await? {
            return Err(LedgerError::AlreadyCompensated(saga_id));
        }

        let result = self.refunds.compensate(&record.report, compensation_id).await;
        self.cache.clear();
        let undo = result?;
        self.journal(&undo).await;
        Ok(undo)
    }

    pub async fn add_credit(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        description: impl Into<String>,
    ) -> LedgerResult<Customer> {
        track(self.credit.add_credit(customer_id, amount, description).await)
    }

    pub async fn remove_credit(
        &self,
        customer_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> LedgerResult<Customer> {
        track(self.credit.remove_credit(customer_id, amount, description).await)
    }

    pub async fn credit_balance(&self, customer_id: Uuid) -> LedgerResult<Decimal> {
        track(self.credit.balance(customer_id).await)
    }

    pub async fn credit_history(&self, customer_id: Uuid) -> LedgerResult<Vec<CreditTransaction>> {
        track(self.credit.history(customer_id).await)
    }
}
