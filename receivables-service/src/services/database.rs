//! PostgreSQL store for receivables-service.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{CreditTransaction, Customer, Receivable};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{CustomerStore, ReceivableStore, SagaStore};
use crate::services::saga::{SagaRecord, SagaReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const RECEIVABLE_COLUMNS: &str = "receivable_id, customer_id, product_id, product_name, cost_price, sale_price, \
     total_amount, paid_amount, remaining_amount, status, payments, due_date, warranty_period_days, \
     archived, sold_on_credit, notes, created_utc, updated_utc, deleted_utc";

const CUSTOMER_COLUMNS: &str = "customer_id, name, phone, credit_balance, created_utc";

fn db_error(context: &str, e: sqlx::Error) -> LedgerError {
    LedgerError::Persistence(anyhow::anyhow!("{}: {}", context, e))
}

/// Connection pool wrapper implementing the ledger stores.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "receivables-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> LedgerResult<Self> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> LedgerResult<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Persistence(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn receivable_exists(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM receivables WHERE receivable_id = $1 AND deleted_utc IS NULL)",
        )
        .bind(receivable_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check receivable", e))
    }
}

#[async_trait]
impl ReceivableStore for PgStore {
    #[instrument(skip(self, receivable), fields(receivable_id = %receivable.receivable_id, customer_id = %receivable.customer_id))]
    async fn insert(&self, receivable: &Receivable) -> LedgerResult<Receivable> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_receivable"])
            .start_timer();

        let sql = format!(
            r#"
            INSERT INTO receivables ({RECEIVABLE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING {RECEIVABLE_COLUMNS}
            "#
        );

        let inserted = sqlx::query_as::<_, Receivable>(&sql)
            .bind(receivable.receivable_id)
            .bind(receivable.customer_id)
            .bind(receivable.product_id)
            .bind(&receivable.product_name)
            .bind(receivable.cost_price)
            .bind(receivable.sale_price)
            .bind(receivable.total_amount)
            .bind(receivable.paid_amount)
            .bind(receivable.remaining_amount)
            .bind(receivable.status.as_str())
            .bind(Json(&receivable.payments))
            .bind(receivable.due_date)
            .bind(receivable.warranty_period_days)
            .bind(receivable.archived)
            .bind(receivable.sold_on_credit)
            .bind(&receivable.notes)
            .bind(receivable.created_utc)
            .bind(receivable.updated_utc)
            .bind(receivable.deleted_utc)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    LedgerError::not_found("customer", receivable.customer_id)
                }
                _ => db_error("Failed to create receivable", e),
            })?;

        timer.observe_duration();

        info!(
            receivable_id = %inserted.receivable_id,
            total_amount = %inserted.total_amount,
            status = %inserted.status,
            "Receivable created"
        );

        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn get(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_receivable"])
            .start_timer();

        let sql = format!(
            "SELECT {RECEIVABLE_COLUMNS} FROM receivables WHERE receivable_id = $1 AND deleted_utc IS NULL"
        );
        let receivable = sqlx::query_as::<_, Receivable>(&sql)
            .bind(receivable_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get receivable", e))?;

        timer.observe_duration();

        Ok(receivable)
    }

    #[instrument(skip(self))]
    async fn get_any(&self, receivable_id: Uuid) -> LedgerResult<Option<Receivable>> {
        let sql = format!("SELECT {RECEIVABLE_COLUMNS} FROM receivables WHERE receivable_id = $1");
        sqlx::query_as::<_, Receivable>(&sql)
            .bind(receivable_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get receivable", e))
    }

    #[instrument(skip(self))]
    async fn list(&self, customer_id: Option<Uuid>) -> LedgerResult<Vec<Receivable>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_receivables"])
            .start_timer();

        let sql = format!(
            r#"
            SELECT {RECEIVABLE_COLUMNS}
            FROM receivables
            WHERE deleted_utc IS NULL
              AND ($1::uuid IS NULL OR customer_id = $1)
            ORDER BY created_utc, receivable_id
            "#
        );
        let rows = sqlx::query_as::<_, Receivable>(&sql)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list receivables", e))?;

        timer.observe_duration();

        Ok(rows)
    }

    #[instrument(skip(self, receivable), fields(receivable_id = %receivable.receivable_id))]
    async fn save(&self, receivable: &Receivable) -> LedgerResult<Receivable> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_receivable"])
            .start_timer();

        let sql = format!(
            r#"
            UPDATE receivables
            SET product_name = $2, cost_price = $3, sale_price = $4, total_amount = $5,
                remaining_amount = $6, status = $7, due_date = $8, warranty_period_days = $9,
                archived = $10, sold_on_credit = $11, notes = $12, updated_utc = NOW()
            WHERE receivable_id = $1 AND deleted_utc IS NULL AND paid_amount = $13
            RETURNING {RECEIVABLE_COLUMNS}
            "#
        );
        let saved = sqlx::query_as::<_, Receivable>(&sql)
            .bind(receivable.receivable_id)
            .bind(&receivable.product_name)
            .bind(receivable.cost_price)
            .bind(receivable.sale_price)
            .bind(receivable.total_amount)
            .bind(receivable.remaining_amount)
            .bind(receivable.status.as_str())
            .bind(receivable.due_date)
            .bind(receivable.warranty_period_days)
            .bind(receivable.archived)
            .bind(receivable.sold_on_credit)
            .bind(&receivable.notes)
            .bind(receivable.paid_amount)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update receivable", e))?;

        timer.observe_duration();

        match saved {
            Some(r) => Ok(r),
            None if self.receivable_exists(receivable.receivable_id).await? => {
                Err(LedgerError::Conflict(receivable.receivable_id))
            }
            None => Err(LedgerError::not_found("receivable", receivable.receivable_id)),
        }
    }

    #[instrument(skip(self, receivable), fields(receivable_id = %receivable.receivable_id, paid_amount = %receivable.paid_amount))]
    async fn record_payment(
        &self,
        receivable: &Receivable,
        previous_paid_amount: Decimal,
    ) -> LedgerResult<Receivable> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let sql = format!(
            r#"
            UPDATE receivables
            SET payments = $2, paid_amount = $3, remaining_amount = $4, status = $5, updated_utc = NOW()
            WHERE receivable_id = $1 AND deleted_utc IS NULL AND paid_amount = $6
            RETURNING {RECEIVABLE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Receivable>(&sql)
            .bind(receivable.receivable_id)
            .bind(Json(&receivable.payments))
            .bind(receivable.paid_amount)
            .bind(receivable.remaining_amount)
            .bind(receivable.status.as_str())
            .bind(previous_paid_amount)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to record payment", e))?;

        timer.observe_duration();

        match updated {
            Some(r) => Ok(r),
            None if self.receivable_exists(receivable.receivable_id).await? => {
                Err(LedgerError::Conflict(receivable.receivable_id))
            }
            None => Err(LedgerError::not_found("receivable", receivable.receivable_id)),
        }
    }

    #[instrument(skip(self))]
    async fn soft_delete(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        let result = sqlx::query(
            "UPDATE receivables SET deleted_utc = NOW(), updated_utc = NOW() WHERE receivable_id = $1 AND deleted_utc IS NULL",
        )
        .bind(receivable_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to delete receivable", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn restore(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        let result = sqlx::query(
            "UPDATE receivables SET deleted_utc = NULL, updated_utc = NOW() WHERE receivable_id = $1 AND deleted_utc IS NOT NULL",
        )
        .bind(receivable_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to restore receivable", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn purge(&self, receivable_id: Uuid) -> LedgerResult<bool> {
        let result = sqlx::query("DELETE FROM receivables WHERE receivable_id = $1")
            .bind(receivable_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to purge receivable", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> LedgerResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for PgStore {
    #[instrument(skip(self))]
    async fn get_customer(&self, customer_id: Uuid) -> LedgerResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = $1");
        sqlx::query_as::<_, Customer>(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get customer", e))
    }

    #[instrument(skip(self, transaction), fields(customer_id = %transaction.customer_id, kind = %transaction.kind, amount = %transaction.amount))]
    async fn apply_credit(&self, transaction: &CreditTransaction) -> LedgerResult<Customer> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_credit"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let delta = transaction.kind.signed(transaction.amount);
        let sql = format!(
            r#"
            UPDATE customers
            SET credit_balance = credit_balance + $2
            WHERE customer_id = $1 AND credit_balance + $2 >= 0
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Customer>(&sql)
            .bind(transaction.customer_id)
            .bind(delta)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to update credit balance", e))?;

        let customer = match updated {
            Some(c) => c,
            None => {
                tx.rollback().await.ok();
                return match self.get_customer(transaction.customer_id).await? {
                    Some(c) => Err(LedgerError::InsufficientBalance {
                        customer_id: c.customer_id,
                        available: c.credit_balance,
                        requested: transaction.amount,
                    }),
                    None => Err(LedgerError::not_found("customer", transaction.customer_id)),
                };
            }
        };

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (transaction_id, customer_id, kind, amount, description, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(transaction.transaction_id)
        .bind(transaction.customer_id)
        .bind(transaction.kind.as_str())
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to append credit transaction", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit credit transaction", e))?;

        timer.observe_duration();

        info!(
            customer_id = %customer.customer_id,
            credit_balance = %customer.credit_balance,
            "Credit balance updated"
        );

        Ok(customer)
    }

    #[instrument(skip(self))]
    async fn credit_transactions(&self, customer_id: Uuid) -> LedgerResult<Vec<CreditTransaction>> {
        sqlx::query_as::<_, CreditTransaction>(
            r#"
            SELECT transaction_id, customer_id, kind, amount, description, created_utc
            FROM credit_transactions
            WHERE customer_id = $1
            ORDER BY created_utc, transaction_id
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list credit transactions", e))
    }
}

#[async_trait]
impl SagaStore for PgStore {
    #[instrument(skip(self, report), fields(saga_id = %report.saga_id, kind = %report.kind))]
    async fn record_saga(&self, report: &SagaReport) -> LedgerResult<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_saga"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO saga_reports (saga_id, kind, subject_id, report, recorded_utc)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (saga_id) DO UPDATE SET report = EXCLUDED.report
            "#,
        )
        .bind(report.saga_id)
        .bind(report.kind.as_str())
        .bind(report.subject_id)
        .bind(Json(report))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record saga report", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_saga(&self, saga_id: Uuid) -> LedgerResult<Option<SagaRecord>> {
        let row = sqlx::query_as::<_, (Json<SagaReport>, Option<Uuid>, DateTime<Utc>)>(
            "SELECT report, compensated_by, recorded_utc FROM saga_reports WHERE saga_id = $1",
        )
        .bind(saga_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get saga report", e))?;

        Ok(row.map(|(Json(report), compensated_by, recorded_utc)| SagaRecord {
            report,
            compensated_by,
            recorded_utc,
        }))
    }

    #[instrument(skip(self))]
    async fn claim_compensation(&self, saga_id: Uuid, compensation_id: Uuid) -> LedgerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE saga_reports
            SET compensated_by = $2
            WHERE saga_id = $1 AND compensated_by IS NULL
            "#,
        )
        .bind(saga_id)
        .bind(compensation_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to claim saga compensation", e))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_saga(saga_id).await? {
            Some(_) => Ok(false),
            None => Err(LedgerError::not_found("saga", saga_id)),
        }
    }
}
