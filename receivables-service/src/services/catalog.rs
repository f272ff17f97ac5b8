//! Product catalog collaborator.
//!
//! The catalog owns product stock. The ledger only tells it when a product
//! left on credit and when such a sale was cancelled.

use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Buyer details forwarded with a credit sale.
#[derive(Debug, Clone, Serialize)]
pub struct BuyerInfo {
    pub name: String,
    pub phone: Option<String>,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn mark_sold_on_credit(
        &self,
        product_id: Uuid,
        buyer: &BuyerInfo,
        amount: Decimal,
        receivable_id: Uuid,
    ) -> LedgerResult<()>;

    /// Return a product to stock.
    async fn cancel_sale(&self, product_id: Uuid) -> LedgerResult<()>;

    /// False when no catalog is wired and calls are no-ops.
    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct CreditSaleRequest<'a> {
    buyer_name: &'a str,
    buyer_phone: Option<&'a str>,
    amount: Decimal,
    receivable_id: Uuid,
}

pub struct HttpCatalogClient {
    client: Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Catalog(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn credit_sale_url(&self, product_id: Uuid) -> String {
        format!("{}/products/{}/credit-sale", self.base_url, product_id)
    }

    async fn check(response: reqwest::Response, url: &str) -> LedgerResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        error!(url = %url, status = %status, body = %body, "Catalog request rejected");
        Err(LedgerError::Catalog(format!(
            "catalog returned {} for {}",
            status, url
        )))
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn mark_sold_on_credit(
        &self,
        product_id: Uuid,
        buyer: &BuyerInfo,
        amount: Decimal,
        receivable_id: Uuid,
    ) -> LedgerResult<()> {
        let url = self.credit_sale_url(product_id);
        let body = CreditSaleRequest {
            buyer_name: &buyer.name,
            buyer_phone: buyer.phone.as_deref(),
            amount,
            receivable_id,
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            error!("Failed to send POST request to {}: {}", url, e);
            LedgerError::Catalog(format!("HTTP request failed: {}", e))
        })?;
        Self::check(response, &url).await?;

        info!(product_id = %product_id, receivable_id = %receivable_id, "Product marked as sold on credit");
        Ok(())
    }

    async fn cancel_sale(&self, product_id: Uuid) -> LedgerResult<()> {
        let url = self.credit_sale_url(product_id);

        let response = self.client.delete(&url).send().await.map_err(|e| {
            error!("Failed to send DELETE request to {}: {}", url, e);
            LedgerError::Catalog(format!("HTTP request failed: {}", e))
        })?;
        Self::check(response, &url).await?;

        info!(product_id = %product_id, "Credit sale cancelled, product restocked");
        Ok(())
    }
}

/// Used when no catalog URL is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCatalogClient;

#[async_trait]
impl CatalogClient for NoopCatalogClient {
    async fn mark_sold_on_credit(
        &self,
        _product_id: Uuid,
        _buyer: &BuyerInfo,
        _amount: Decimal,
        _receivable_id: Uuid,
    ) -> LedgerResult<()> {
        Ok(())
    }

    async fn cancel_sale(&self, _product_id: Uuid) -> LedgerResult<()> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
