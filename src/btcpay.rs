//! BTCPay Server pull-payment client
//!
//! Thin wrapper over the Greenfield API for a single store:
//! - `POST   /api/v1/stores/{store_id}/pull-payments`
//! - `DELETE /api/v1/stores/{store_id}/pull-payments/{id}`
//!
//! Authenticates with `Authorization: token {api_key}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("island-rewards/", env!("CARGO_PKG_VERSION"));

/// Pull payments are denominated in satoshis
pub const SATS_CURRENCY: &str = "SATS";

#[derive(Debug, Error)]
pub enum BtcPayError {
    #[error("BTCPay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("BTCPay API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// Body of a create-pull-payment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePullPaymentRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Satoshis, as a decimal string
    pub amount: String,
    pub currency: String,
    /// Equal to `amount` so the pull payment can only be claimed in full
    pub min_amount: String,
    pub auto_approve_claims: bool,
    /// Invoice lifetime in days (fractions allowed)
    #[serde(rename = "BOLT11Expiration", skip_serializing_if = "Option::is_none")]
    pub bolt11_expiration: Option<String>,
    /// Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl CreatePullPaymentRequest {
    /// A pull payment that must be withdrawn as exactly `amount_sats`.
    pub fn exact_amount(name: impl Into<String>, description: impl Into<String>, amount_sats: u64) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            amount: amount_sats.to_string(),
            currency: SATS_CURRENCY.to_string(),
            min_amount: amount_sats.to_string(),
            auto_approve_claims: true,
            bolt11_expiration: None,
            expires_at: None,
        }
    }

    pub fn with_bolt11_expiration(mut self, lifetime: Duration) -> Self {
        self.bolt11_expiration = Some(duration_as_days(lifetime));
        self
    }

    pub fn with_expires_at(mut self, unix_secs: i64) -> Self {
        self.expires_at = Some(unix_secs);
        self
    }
}

fn duration_as_days(lifetime: Duration) -> String {
    let days = lifetime.as_secs_f64() / 86_400.0;
    format!("{:.6}", days)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Pull payment as returned by BTCPay. Only `id` is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullPaymentResponse {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub period: Option<i64>,
    #[serde(rename = "BOLT11Expiration", default)]
    pub bolt11_expiration: Option<serde_json::Value>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub view_link: Option<String>,
    #[serde(default)]
    pub auto_approve_claims: bool,
}

/// Pull-payment operations the withdrawal flow depends on
#[async_trait]
pub trait PullPaymentApi: Send + Sync {
    async fn create_pull_payment(
        &self,
        request: &CreatePullPaymentRequest,
    ) -> Result<PullPaymentResponse, BtcPayError>;

    /// Succeeds if the pull payment is gone, including when it never existed.
    async fn delete_pull_payment(&self, pull_payment_id: &str) -> Result<(), BtcPayError>;

    async fn archive_pull_payment(&self, pull_payment_id: &str) -> Result<(), BtcPayError>;
}

pub struct BtcPayClient {
    client: Client,
    base_url: String,
    store_id: String,
    api_key: String,
}

impl BtcPayClient {
    pub fn new(base_url: &str, store_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        // Build HTTP client with timeout, falling back to default client if builder fails
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store_id: store_id.into(),
            api_key: api_key.into(),
        }
    }

    fn pull_payments_url(&self) -> String {
        format!(
            "{}/api/v1/stores/{}/pull-payments",
            self.base_url, self.store_id
        )
    }

    fn pull_payment_url(&self, pull_payment_id: &str) -> String {
        format!("{}/{}", self.pull_payments_url(), pull_payment_id)
    }

    fn build_request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Authorization", format!("token {}", self.api_key))
    }

    async fn remove(&self, pull_payment_id: &str, action: &str) -> Result<(), BtcPayError> {
        let url = self.pull_payment_url(pull_payment_id);
        let response = self.build_request(Method::DELETE, &url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!("Pull payment {} already gone ({})", pull_payment_id, action);
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Failed to {} pull payment {}: {} {}", action, pull_payment_id, status, body);
            return Err(BtcPayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!("Pull payment {} {}d", pull_payment_id, action);
        Ok(())
    }
}

#[async_trait]
impl PullPaymentApi for BtcPayClient {
    async fn create_pull_payment(
        &self,
        request: &CreatePullPaymentRequest,
    ) -> Result<PullPaymentResponse, BtcPayError> {
        let url = self.pull_payments_url();
        debug!("Creating pull payment for {} sats", request.amount);

        let response = self
            .build_request(Method::POST, &url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("BTCPay API error {}: {}", status, body);
            return Err(BtcPayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let pull_payment: PullPaymentResponse = response.json().await?;
        info!("Created pull payment {}", pull_payment.id);
        Ok(pull_payment)
    }

    async fn delete_pull_payment(&self, pull_payment_id: &str) -> Result<(), BtcPayError> {
        self.remove(pull_payment_id, "delete").await
    }

    /// Greenfield archives a pull payment through the same DELETE route.
    async fn archive_pull_payment(&self, pull_payment_id: &str) -> Result<(), BtcPayError> {
        self.remove(pull_payment_id, "archive").await
    }
}
