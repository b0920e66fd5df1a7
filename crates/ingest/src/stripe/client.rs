//! Thin Stripe REST client.
//!
//! Fetches the supplementary objects a webhook event references but does not
//! embed (subscriptions, customers, products, invoices, charges, checkout
//! line items). Calls are synchronous per request with no internal retry; a
//! stalled call stalls the webhook response, which is acceptable because
//! handlers are short-lived platform-invoked units.

use serde::de::DeserializeOwned;

use crate::error::{IngestError, IngestResult};
use crate::stripe::types::{
    Charge, Invoice, LineItem, ObjectList, StripeCustomer, StripeProduct, StripeSubscription,
};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe credentials and endpoint configuration.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_live_...` / `sk_test_...`).
    pub api_key: String,
    /// Webhook signing secret (`whsec_...`).
    pub webhook_secret: String,
    /// Overridable for tests.
    pub api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Read `STRIPE_API_KEY` and `STRIPE_WEBHOOK_SIGNING_SECRET`.
    pub fn from_env() -> IngestResult<Self> {
        let api_key = std::env::var("STRIPE_API_KEY")
            .map_err(|_| IngestError::Config("STRIPE_API_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SIGNING_SECRET")
            .map_err(|_| IngestError::Config("STRIPE_WEBHOOK_SIGNING_SECRET not set".to_string()))?;
        Ok(Self::new(api_key, webhook_secret))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

/// Provider client adapter over the Stripe REST API.
#[derive(Clone)]
pub struct StripeClient {
    config: StripeConfig,
    http: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> IngestResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> IngestResult<T> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.api_key, Option::<&str>::None)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(path = path, status = %status, error = %body, "Stripe API request failed");
            return Err(IngestError::Provider(format!(
                "Stripe API returned {} for {}",
                status, path
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| IngestError::Provider(format!("unexpected Stripe response shape: {}", e)))
    }

    pub async fn retrieve_subscription(&self, id: &str) -> IngestResult<StripeSubscription> {
        self.get(&format!("/v1/subscriptions/{}", id)).await
    }

    pub async fn retrieve_customer(&self, id: &str) -> IngestResult<StripeCustomer> {
        self.get(&format!("/v1/customers/{}", id)).await
    }

    pub async fn retrieve_product(&self, id: &str) -> IngestResult<StripeProduct> {
        self.get(&format!("/v1/products/{}", id)).await
    }

    pub async fn retrieve_invoice(&self, id: &str) -> IngestResult<Invoice> {
        self.get(&format!("/v1/invoices/{}", id)).await
    }

    pub async fn retrieve_charge(&self, id: &str) -> IngestResult<Charge> {
        self.get(&format!("/v1/charges/{}", id)).await
    }

    pub async fn list_checkout_line_items(
        &self,
        session_id: &str,
    ) -> IngestResult<ObjectList<LineItem>> {
        self.get(&format!("/v1/checkout/sessions/{}/line_items", session_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> StripeClient {
        StripeClient::new(StripeConfig::new("sk_test_x", "whsec_x").with_base_url(server.url()))
    }

    #[tokio::test]
    async fn retrieves_and_parses_a_product() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/products/prod_1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"prod_1","name":"Course A"}"#)
            .create_async()
            .await;

        let product = client_for(&server)
            .retrieve_product("prod_1")
            .await
            .unwrap();
        assert_eq!(product.name, "Course A");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_surface_as_provider_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/charges/ch_missing")
            .with_status(404)
            .with_body(r#"{"error":{"message":"No such charge"}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .retrieve_charge("ch_missing")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Provider(_)));
    }

    #[tokio::test]
    async fn line_items_list_parses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/checkout/sessions/cs_1/line_items")
            .with_status(200)
            .with_body(
                r#"{"object":"list","data":[{"description":"Course A","amount_total":9900,"price":{"unit_amount":9900,"product":"prod_1"}}]}"#,
            )
            .create_async()
            .await;

        let items = client_for(&server)
            .list_checkout_line_items("cs_1")
            .await
            .unwrap();
        assert_eq!(items.data.len(), 1);
        assert_eq!(items.data[0].price.as_ref().unwrap().unit_amount, Some(9900));
    }
}
