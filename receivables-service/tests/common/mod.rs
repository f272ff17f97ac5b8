//! Common test utilities for receivables-service integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use receivables_service::error::{LedgerError, LedgerResult};
use receivables_service::models::{CreateReceivable, Customer, PaymentMethod, Receivable};
use receivables_service::services::{
    BuyerInfo, CatalogClient, FixedClock, InMemoryStore, OverpaymentPolicy, PgStore,
    ReceivableCache, ReceivableStore, ReceivablesLedger,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,receivables_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn money(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Connect to the test database and bring the schema up to date.
pub async fn pg_store() -> PgStore {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set - use scripts/integ-tests.sh to run tests");

    let store = PgStore::connect(&database_url, 2, 1)
        .await
        .expect("Failed to connect to test database");
    store
        .run_migrations()
        .await
        .expect("Failed to run migrations");
    store
}

/// Seed a customer row with a unique id, as the customer service would.
pub async fn pg_customer(store: &PgStore, credit_balance: &str) -> Uuid {
    let customer_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO customers (customer_id, name, phone, credit_balance, created_utc) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(customer_id)
    .bind("Test Customer")
    .bind(None::<String>)
    .bind(money(credit_balance))
    .bind(start_time())
    .execute(store.pool())
    .await
    .expect("Failed to seed customer");
    customer_id
}

/// Receivable store that can be told to fail specific writes.
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    payments_before_failure: AtomicUsize,
    fail_soft_delete: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            payments_before_failure: AtomicUsize::new(usize::MAX),
            fail_soft_delete: AtomicBool::new(false),
        }
    }

    /// Let `n` more payment writes through, then fail every one after.
    pub fn fail_payments_after(&self, n: usize) {
        self.payments_before_failure.store(n, Ordering::SeqCst);
    }

    pub fn fail_soft_delete(&self, fail: bool) {
        self.fail_soft_delete.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReceivableStore for FlakyStore {
    async fn insert(&self, receivable: &Receivable) -> LedgerResult<Receivable> {
        self.inner.insert(receivable).await
    }

    async fn get(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>> {
        self.inner.get(receivable_id).await
    }

    async fn get_any(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>> {
        self.inner.get_any(receivable_id).await
    }

    async fn list(&self, customer_id: Option<Uuid>) -> LedgerResult<Vec<Receivable>> {
        self.inner.list(customer_id).await
    }

    async fn save(&self, receivable: &Receivable) -> LedgerResult<Receivable> {
        self.inner.save(receivable).await
    }

    async fn record_payment(
        &self,
        receivable: &Receivable,
        previous_paid_amount: Decimal,
    ) -> LedgerResult<Receivable> {
        let allowed = self
            .payments_before_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == 0 {
                    None
                } else if n == usize::MAX {
                    Some(n)
                } else {
                    Some(n - 1)
                }
            })
            .is_ok();
        if !allowed {
            return Err(LedgerError::Persistence(anyhow::anyhow!(
                "connection reset by peer"
            )));
        }
        self.inner
            .record_payment(receivable, previous_paid_amount)
            .await
    }

    async fn soft_delete(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        if self.fail_soft_delete.load(Ordering::SeqCst) {
            return Err(LedgerError::Persistence(anyhow::anyhow!("store unavailable")));
        }
        self.inner.soft_delete(receivable_id).await
    }

    async fn restore(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        self.inner.restore(receivable_id).await
    }

    async fn purge(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        self.inner.purge(receivable_id).await
    }

    async fn health_check(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogCall {
    MarkSoldOnCredit {
        product_id: Uuid,
        buyer_name: String,
        amount: Decimal,
        receivable_id: Uuid,
    },
    CancelSale {
        product_id: Uuid,
    },
}

/// Catalog double that records every call.
#[derive(Default)]
pub struct RecordingCatalog {
    pub calls: Mutex<Vec<CatalogCall>>,
    fail_mark: AtomicBool,
    fail_cancel: AtomicBool,
}

impl RecordingCatalog {
    pub fn fail_mark(&self, fail: bool) {
        self.fail_mark.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancellations(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, CatalogCall::CancelSale { .. }))
            .count()
    }
}

#[async_trait]
impl CatalogClient for RecordingCatalog {
    async fn mark_sold_on_credit(
        &self,
        product_id: Uuid,
        buyer: &BuyerInfo,
        amount: Decimal,
        receivable_id: Uuid,
    ) -> LedgerResult<()> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(LedgerError::Catalog("catalog returned 503".to_string()));
        }
        self.calls.lock().unwrap().push(CatalogCall::MarkSoldOnCredit {
            product_id,
            buyer_name: buyer.name.clone(),
            amount,
            receivable_id,
        });
        Ok(())
    }

    async fn cancel_sale(&self, product_id: Uuid) -> LedgerResult<()> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(LedgerError::Catalog("catalog timed out".to_string()));
        }
        self.calls
            .lock()
            .unwrap()
            .push(CatalogCall::CancelSale { product_id });
        Ok(())
    }
}

/// Ledger wired to in-memory collaborators plus handles to steer them.
pub struct TestLedger {
    pub ledger: ReceivablesLedger,
    pub store: Arc<InMemoryStore>,
    pub flaky: Arc<FlakyStore>,
    pub catalog: Arc<RecordingCatalog>,
    pub clock: Arc<FixedClock>,
    pub customer_id: Uuid,
}

impl TestLedger {
    pub async fn new() -> Self {
        Self::build(OverpaymentPolicy::Report, false).await
    }

    pub async fn with_policy(policy: OverpaymentPolicy) -> Self {
        Self::build(policy, false).await
    }

    pub async fn build(policy: OverpaymentPolicy, cache_enabled: bool) -> Self {
        init_tracing();

        let store = Arc::new(InMemoryStore::new());
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let catalog = Arc::new(RecordingCatalog::default());
        let clock = Arc::new(FixedClock::new(start_time()));

        let ledger = ReceivablesLedger::new(
            flaky.clone(),
            store.clone(),
            store.clone(),
            catalog.clone(),
            clock.clone(),
            policy,
            ReceivableCache::new(cache_enabled),
        );

        let mut harness = Self {
            ledger,
            store,
            flaky,
            catalog,
            clock,
            customer_id: Uuid::nil(),
        };
        harness.customer_id = harness.add_customer("Maria Souza").await;
        harness
    }

    pub async fn add_customer(&self, name: &str) -> Uuid {
        let customer_id = Uuid::new_v4();
        self.store
            .insert_customer(Customer {
                customer_id,
                name: name.to_string(),
                phone: Some("+55 11 99999-0000".to_string()),
                credit_balance: Decimal::ZERO,
                created_utc: start_time(),
            })
            .await;
        customer_id
    }

    pub fn sale_input(&self, product_name: &str, total: &str) -> CreateReceivable {
        CreateReceivable {
            customer_id: self.customer_id,
            product_id: None,
            product_name: product_name.to_string(),
            cost_price: None,
            sale_price: Some(money(total)),
            total_amount: money(total),
            paid_amount: Decimal::ZERO,
            payment_method: PaymentMethod::Cash,
            due_date: None,
            warranty_period_days: 0,
            notes: None,
        }
    }

    /// Record a sale for the default customer, then move the clock a day
    /// forward so the next sale is strictly newer.
    pub async fn sale(&self, product_name: &str, total: &str) -> Receivable {
        self.sale_with(self.sale_input(product_name, total)).await
    }

    pub async fn sale_with(&self, input: CreateReceivable) -> Receivable {
        let receivable = self.ledger.create_receivable(input).await.unwrap();
        self.clock.advance(Duration::days(1));
        receivable
    }

    pub async fn reload(&self, receivable_id: Uuid) -> Receivable {
        self.store.get_any(receivable_id).await.unwrap().unwrap()
    }

    pub async fn balance(&self) -> Decimal {
        self.ledger.credit_balance(self.customer_id).await.unwrap()
    }
}

/// Invariants every stored receivable must satisfy.
pub fn assert_reconciled(receivable: &Receivable) {
    assert_eq!(
        receivable.paid_amount,
        receivable.payments_total(),
        "paid_amount must equal the sum of payments"
    );
    let expected_remaining = (receivable.total_amount - receivable.paid_amount).max(Decimal::ZERO);
    assert_eq!(receivable.remaining_amount, expected_remaining);
    assert!(receivable.paid_amount <= receivable.total_amount);
}
