//! Application startup and lifecycle management.

use crate::config::ReceivablesConfig;
use crate::handlers;
use crate::services::{
    init_metrics, CatalogClient, HttpCatalogClient, NoopCatalogClient, PgStore, ReceivableCache,
    ReceivablesLedger, SystemClock,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{http_trace_layer, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ReceivablesLedger>,
}

impl AppState {
    pub fn new(ledger: ReceivablesLedger) -> Self {
        Self {
            ledger: Arc::new(ledger),
        }
    }
}

/// Full HTTP surface.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/receivables",
            post(handlers::create_receivable).get(handlers::list_receivables),
        )
        .route(
            "/receivables/:receivable_id",
            get(handlers::get_receivable)
                .patch(handlers::update_receivable)
                .delete(handlers::purge_receivable),
        )
        .route(
            "/receivables/:receivable_id/payments",
            post(handlers::add_payment),
        )
        .route(
            "/receivables/:receivable_id/refund",
            get(handlers::refund_decision).post(handlers::refund_receivable),
        )
        .route(
            "/receivables/:receivable_id/restore",
            post(handlers::restore_receivable),
        )
        .route(
            "/receivables/:receivable_id/archived",
            put(handlers::set_archived),
        )
        .route(
            "/customers/:customer_id/allocations",
            post(handlers::allocate_payment),
        )
        .route(
            "/customers/:customer_id/summary",
            get(handlers::customer_summary),
        )
        .route(
            "/customers/:customer_id/credit",
            get(handlers::get_credit).post(handlers::add_credit),
        )
        .route(
            "/customers/:customer_id/credit/withdrawals",
            post(handlers::remove_credit),
        )
        .route("/sagas/:saga_id", get(handlers::get_saga))
        .route("/sagas/:saga_id/compensate", post(handlers::compensate))
        .layer(middleware::from_fn(handlers::http_metrics_middleware))
        .layer(http_trace_layer())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReceivablesConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    pub async fn build_without_migrations(config: ReceivablesConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: ReceivablesConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let store = PgStore::connect(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            AppError::from(e)
        })?;

        if run_migrations {
            store.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                AppError::from(e)
            })?;
        }

        let catalog: Arc<dyn CatalogClient> = match &config.catalog.url {
            Some(url) => {
                tracing::info!(endpoint = %url, "Catalog collaborator configured");
                Arc::new(HttpCatalogClient::new(url.clone(), config.catalog.timeout)?)
            }
            None => {
                tracing::info!("Catalog URL not configured - catalog steps will be skipped");
                Arc::new(NoopCatalogClient)
            }
        };

        let store = Arc::new(store);
        let ledger = ReceivablesLedger::new(
            store.clone(),
            store.clone(),
            store,
            catalog,
            Arc::new(SystemClock),
            config.ledger.overpayment_policy,
            ReceivableCache::new(config.ledger.cache_enabled),
        );
        let state = AppState::new(ledger);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Receivables service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "receivables-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
