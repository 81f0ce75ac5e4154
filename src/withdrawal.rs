//! LNURL-withdraw orchestration
//!
//! Turns an amount into a scannable withdrawal:
//! 1. obtain a pull payment (fresh exact-amount one when store credentials are
//!    configured, otherwise the shared static one)
//! 2. build `{server}/BTC/UILNURL/withdraw/pp/{id}`
//! 3. bech32-encode it as an LNURL
//! 4. render the LNURL as a QR code data URL

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::btcpay::{BtcPayClient, BtcPayError, CreatePullPaymentRequest, PullPaymentApi};
use crate::identity::pubkey_prefix;
use crate::lnurl::{encode_lnurl, LnurlError};

/// Lifetime of the BOLT11 invoice a wallet submits against the pull payment
pub const BOLT11_EXPIRATION: Duration = Duration::from_secs(60 * 60);

/// Lifetime of a dynamically created pull payment
pub const PULL_PAYMENT_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

const QR_MIN_DIMENSION: u32 = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullPaymentConfig {
    pub server_url: String,
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub pull_payment_id: Option<String>,
    /// Use the static pull payment even when store credentials are present
    #[serde(default)]
    pub force_static: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalMode {
    /// A new pull payment per withdrawal
    Dynamic,
    /// One shared pull payment
    Static,
    Disabled,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl PullPaymentConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((non_empty(&self.store_id)?, non_empty(&self.api_key)?))
    }

    pub fn static_pull_payment_id(&self) -> Option<&str> {
        non_empty(&self.pull_payment_id)
    }

    /// Dynamic creation wins over the static id unless `force_static` is set.
    pub fn mode(&self) -> WithdrawalMode {
        if self.server_url.trim().is_empty() {
            return WithdrawalMode::Disabled;
        }
        if !self.force_static && self.credentials().is_some() {
            WithdrawalMode::Dynamic
        } else if self.static_pull_payment_id().is_some() {
            WithdrawalMode::Static
        } else {
            WithdrawalMode::Disabled
        }
    }
}

/// True iff a static pull payment id and a server URL are both set.
pub fn is_pull_payment_configured(config: &PullPaymentConfig) -> bool {
    config.static_pull_payment_id().is_some() && !config.server_url.trim().is_empty()
}

pub fn build_withdraw_endpoint(server_url: &str, pull_payment_id: &str) -> String {
    format!(
        "{}/BTC/UILNURL/withdraw/pp/{}",
        server_url.trim_end_matches('/'),
        pull_payment_id
    )
}

/// Black-on-white SVG QR code with quiet zone, as a base64 data URL.
pub fn render_qr_data_url(data: &str) -> Result<String, WithdrawalError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| WithdrawalError::Qr(e.to_string()))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .quiet_zone(true)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

#[derive(Debug, Error)]
pub enum WithdrawalError {
    #[error("invalid amount: must be greater than zero")]
    InvalidAmount,

    #[error("no usable pull payment configuration")]
    MissingConfiguration,

    #[error(transparent)]
    BtcPay(#[from] BtcPayError),

    #[error("failed to encode LNURL: {0}")]
    Encoding(#[from] LnurlError),

    #[error("failed to render QR code: {0}")]
    Qr(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalQr {
    pub qr_code_url: String,
    pub lnurl: String,
    pub pull_payment_id: String,
}

pub struct WithdrawalOrchestrator {
    config: PullPaymentConfig,
    api: Option<Arc<dyn PullPaymentApi>>,
}

impl WithdrawalOrchestrator {
    /// Build a BTCPay client from the config's store credentials, if any.
    pub fn from_config(config: PullPaymentConfig) -> Self {
        let api = config.credentials().map(|(store_id, api_key)| {
            Arc::new(BtcPayClient::new(&config.server_url, store_id, api_key))
                as Arc<dyn PullPaymentApi>
        });
        Self { config, api }
    }

    pub fn with_api(config: PullPaymentConfig, api: Arc<dyn PullPaymentApi>) -> Self {
        Self {
            config,
            api: Some(api),
        }
    }

    pub fn config(&self) -> &PullPaymentConfig {
        &self.config
    }

    pub fn mode(&self) -> WithdrawalMode {
        match self.config.mode() {
            WithdrawalMode::Dynamic if self.api.is_none() => WithdrawalMode::Disabled,
            mode => mode,
        }
    }

    /// Produce a withdrawal QR, or `None` on any failure (logged).
    pub async fn generate_withdrawal_qr(
        &self,
        amount: u64,
        description: &str,
        user_pubkey: Option<&str>,
    ) -> Option<WithdrawalQr> {
        match self
            .try_generate_withdrawal_qr(amount, description, user_pubkey)
            .await
        {
            Ok(qr) => Some(qr),
            Err(e) => {
                error!("Failed to generate withdrawal QR: {}", e);
                None
            }
        }
    }

    pub async fn try_generate_withdrawal_qr(
        &self,
        amount: u64,
        description: &str,
        user_pubkey: Option<&str>,
    ) -> Result<WithdrawalQr, WithdrawalError> {
        if amount == 0 {
            return Err(WithdrawalError::InvalidAmount);
        }

        let (pull_payment_id, created) = match (self.mode(), &self.api) {
            (WithdrawalMode::Dynamic, Some(api)) => {
                let description = match user_pubkey {
                    Some(pk) => format!("{} (player {})", description, pubkey_prefix(pk)),
                    None => description.to_string(),
                };
                let expires_at = Utc::now().timestamp() + PULL_PAYMENT_LIFETIME.as_secs() as i64;
                let request = CreatePullPaymentRequest::exact_amount(
                    format!("Island Bitcoin reward: {} sats", amount),
                    description,
                    amount,
                )
                .with_bolt11_expiration(BOLT11_EXPIRATION)
                .with_expires_at(expires_at);

                (api.create_pull_payment(&request).await?.id, true)
            }
            (WithdrawalMode::Static, _) => (
                self.config
                    .static_pull_payment_id()
                    .ok_or(WithdrawalError::MissingConfiguration)?
                    .to_string(),
                false,
            ),
            _ => return Err(WithdrawalError::MissingConfiguration),
        };

        match self.render(&pull_payment_id) {
            Ok((lnurl, qr_code_url)) => {
                info!("Withdrawal ready for {} sats via pull payment {}", amount, pull_payment_id);
                Ok(WithdrawalQr {
                    qr_code_url,
                    lnurl,
                    pull_payment_id,
                })
            }
            Err(e) => {
                if created {
                    self.archive_unused(&pull_payment_id).await;
                }
                Err(e)
            }
        }
    }

    /// LNURL and QR data URL for a pull payment.
    fn render(&self, pull_payment_id: &str) -> Result<(String, String), WithdrawalError> {
        let endpoint = build_withdraw_endpoint(&self.config.server_url, pull_payment_id);
        let lnurl = encode_lnurl(&endpoint)?;
        let qr_code_url = render_qr_data_url(&lnurl)?;
        Ok((lnurl, qr_code_url))
    }

    /// Auto-approved pull payments nobody can scan must not stay claimable.
    async fn archive_unused(&self, pull_payment_id: &str) {
        let Some(api) = &self.api else { return };
        match api.archive_pull_payment(pull_payment_id).await {
            Ok(()) => info!("Archived unused pull payment {}", pull_payment_id),
            Err(e) => warn!("Failed to archive pull payment {}: {}", pull_payment_id, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::btcpay::PullPaymentResponse;
    use crate::lnurl::decode_lnurl;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const PK: &str = "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d";

    /// In-process stand-in for BTCPay that records every request
    #[derive(Default)]
    pub(crate) struct FakePullPayments {
        pub requests: Mutex<Vec<CreatePullPaymentRequest>>,
        pub archived: Mutex<Vec<String>>,
        pub fail_with: Option<u16>,
    }

    impl FakePullPayments {
        pub fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PullPaymentApi for FakePullPayments {
        async fn create_pull_payment(
            &self,
            request: &CreatePullPaymentRequest,
        ) -> Result<PullPaymentResponse, BtcPayError> {
            if let Some(status) = self.fail_with {
                return Err(BtcPayError::Api {
                    status,
                    body: "store misconfigured".to_string(),
                });
            }
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            Ok(PullPaymentResponse {
                id: format!("pp{}", requests.len()),
                name: Some(request.name.clone()),
                description: request.description.clone(),
                currency: Some(request.currency.clone()),
                amount: Some(request.amount.clone()),
                period: None,
                bolt11_expiration: None,
                archived: false,
                view_link: None,
                auto_approve_claims: request.auto_approve_claims,
            })
        }

        async fn delete_pull_payment(&self, _pull_payment_id: &str) -> Result<(), BtcPayError> {
            Ok(())
        }

        async fn archive_pull_payment(&self, pull_payment_id: &str) -> Result<(), BtcPayError> {
            self.archived.lock().push(pull_payment_id.to_string());
            Ok(())
        }
    }

    pub(crate) fn dynamic_config() -> PullPaymentConfig {
        PullPaymentConfig {
            server_url: "https://btcpay.example.com/".to_string(),
            store_id: Some("store123".to_string()),
            api_key: Some("key".to_string()),
            pull_payment_id: None,
            force_static: false,
        }
    }

    fn static_config() -> PullPaymentConfig {
        PullPaymentConfig {
            server_url: "https://btcpay.example.com".to_string(),
            pull_payment_id: Some("shared-pp".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dynamic_withdrawal_end_to_end() {
        let api = Arc::new(FakePullPayments::default());
        let orchestrator = WithdrawalOrchestrator::with_api(dynamic_config(), api.clone());

        let qr = orchestrator
            .generate_withdrawal_qr(500, "Satoshi Stacker reward", Some(PK))
            .await
            .unwrap();

        assert!(qr.lnurl.starts_with("lnurl1"));
        assert_eq!(qr.pull_payment_id, "pp1");
        let endpoint = decode_lnurl(&qr.lnurl).unwrap();
        assert_eq!(
            endpoint,
            "https://btcpay.example.com/BTC/UILNURL/withdraw/pp/pp1"
        );
        assert!(endpoint.contains(&qr.pull_payment_id));

        let svg_b64 = qr.qr_code_url.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(svg_b64).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#000000"));

        let requests = api.requests.lock();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.amount, "500");
        assert_eq!(req.amount, req.min_amount);
        assert!(req.auto_approve_claims);
        assert!(req.description.as_deref().unwrap().contains("3bf0c63f"));
        assert!(!req.description.as_deref().unwrap().contains(PK));
        assert_eq!(req.bolt11_expiration.as_deref(), Some("0.041667"));
        assert!(req.expires_at.unwrap() > Utc::now().timestamp() + 23 * 3600);
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let api = Arc::new(FakePullPayments::default());
        let orchestrator = WithdrawalOrchestrator::with_api(dynamic_config(), api.clone());

        assert!(orchestrator.generate_withdrawal_qr(0, "x", None).await.is_none());
        assert!(matches!(
            orchestrator.try_generate_withdrawal_qr(0, "x", None).await,
            Err(WithdrawalError::InvalidAmount)
        ));
        assert!(api.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_static_fallback() {
        let orchestrator = WithdrawalOrchestrator::from_config(static_config());
        assert_eq!(orchestrator.mode(), WithdrawalMode::Static);

        let qr = orchestrator.generate_withdrawal_qr(21, "x", None).await.unwrap();
        assert_eq!(qr.pull_payment_id, "shared-pp");
        assert_eq!(
            decode_lnurl(&qr.lnurl).unwrap(),
            "https://btcpay.example.com/BTC/UILNURL/withdraw/pp/shared-pp"
        );
    }

    #[tokio::test]
    async fn test_force_static_skips_creation() {
        let api = Arc::new(FakePullPayments::default());
        let config = PullPaymentConfig {
            pull_payment_id: Some("shared-pp".to_string()),
            force_static: true,
            ..dynamic_config()
        };
        let orchestrator = WithdrawalOrchestrator::with_api(config, api.clone());

        let qr = orchestrator.generate_withdrawal_qr(21, "x", None).await.unwrap();
        assert_eq!(qr.pull_payment_id, "shared-pp");
        assert!(api.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let config = PullPaymentConfig {
            server_url: "https://btcpay.example.com".to_string(),
            store_id: Some("store123".to_string()),
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        let orchestrator = WithdrawalOrchestrator::from_config(config);
        assert_eq!(orchestrator.mode(), WithdrawalMode::Disabled);
        assert!(matches!(
            orchestrator.try_generate_withdrawal_qr(10, "x", None).await,
            Err(WithdrawalError::MissingConfiguration)
        ));
    }

    #[tokio::test]
    async fn test_upstream_failure_collapses_to_none() {
        let api = Arc::new(FakePullPayments::failing(401));
        let orchestrator = WithdrawalOrchestrator::with_api(dynamic_config(), api);

        assert!(orchestrator.generate_withdrawal_qr(50, "x", None).await.is_none());
        match orchestrator.try_generate_withdrawal_qr(50, "x", None).await {
            Err(WithdrawalError::BtcPay(BtcPayError::Api { status, .. })) => assert_eq!(status, 401),
            other => panic!("expected BTCPay error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrenderable_withdrawal_archives_created_pull_payment() {
        let api = Arc::new(FakePullPayments::default());
        // Too long for any QR code version
        let config = PullPaymentConfig {
            server_url: format!("https://btcpay.example.com/{}", "a".repeat(3000)),
            ..dynamic_config()
        };
        let orchestrator = WithdrawalOrchestrator::with_api(config, api.clone());

        assert!(matches!(
            orchestrator.try_generate_withdrawal_qr(100, "x", None).await,
            Err(WithdrawalError::Qr(_))
        ));
        assert_eq!(api.requests.lock().len(), 1);
        assert_eq!(*api.archived.lock(), vec!["pp1".to_string()]);
    }

    #[tokio::test]
    async fn test_unrenderable_static_withdrawal_is_not_archived() {
        let api = Arc::new(FakePullPayments::default());
        let config = PullPaymentConfig {
            server_url: format!("https://btcpay.example.com/{}", "a".repeat(3000)),
            pull_payment_id: Some("shared-pp".to_string()),
            force_static: true,
            ..dynamic_config()
        };
        let orchestrator = WithdrawalOrchestrator::with_api(config, api.clone());

        assert!(orchestrator.generate_withdrawal_qr(100, "x", None).await.is_none());
        assert!(api.archived.lock().is_empty());
    }

    #[test]
    fn test_is_pull_payment_configured() {
        assert!(is_pull_payment_configured(&static_config()));
        assert!(!is_pull_payment_configured(&dynamic_config()));
        assert!(!is_pull_payment_configured(&PullPaymentConfig {
            server_url: String::new(),
            ..static_config()
        }));
        assert!(!is_pull_payment_configured(&PullPaymentConfig {
            pull_payment_id: Some(String::new()),
            ..static_config()
        }));
    }

    #[test]
    fn test_mode_precedence() {
        assert_eq!(dynamic_config().mode(), WithdrawalMode::Dynamic);
        let both = PullPaymentConfig {
            pull_payment_id: Some("shared-pp".to_string()),
            ..dynamic_config()
        };
        assert_eq!(both.mode(), WithdrawalMode::Dynamic);
        assert_eq!(PullPaymentConfig::default().mode(), WithdrawalMode::Disabled);
    }

    #[test]
    fn test_build_withdraw_endpoint() {
        assert_eq!(
            build_withdraw_endpoint("https://pay.example.com/", "abc"),
            "https://pay.example.com/BTC/UILNURL/withdraw/pp/abc"
        );
    }
}
