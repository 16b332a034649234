//! HTTP adapter for the card gateway's settlement API.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

use super::{GatewayError, PaymentGateway, ProviderApproval};
use crate::config::GatewayConfig;

#[derive(Debug, Serialize)]
struct ApproveRequest {
    amount: u64,
}

#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    fn settlement_url(&self, tid: &str) -> String {
        format!(
            "{}/v1/payments/{}",
            self.config.api_base_url.trim_end_matches('/'),
            tid
        )
    }
}

/// `hex(HMAC-SHA256(secret, "tid|amount|ediDate"))`
pub fn approval_signature(secret: &str, tid: &str, amount: u64, edi_date: &str) -> Option<String> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("{}|{}|{}", tid, amount, edi_date).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.secret_key.expose_secret().is_empty()
    }

    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    async fn approve(&self, tid: &str, amount: u64) -> Result<ProviderApproval, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = self.settlement_url(tid);
        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.secret_key.expose_secret()),
            )
            .json(&ApproveRequest { amount })
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        tracing::debug!(status = %status, tid, "Gateway settlement response received");

        // Declines arrive as JSON with a non-success code, sometimes on 4xx.
        match serde_json::from_str::<ProviderApproval>(&body) {
            Ok(approval) => Ok(approval),
            Err(e) => {
                tracing::error!(
                    status = %status,
                    tid,
                    body = %body,
                    error = %e,
                    "Unreadable gateway settlement response"
                );
                if status.is_server_error() {
                    Err(GatewayError::Transport(format!("gateway returned {}", status)))
                } else {
                    Err(GatewayError::InvalidResponse(e.to_string()))
                }
            }
        }
    }

    fn verify_signature(&self, approval: &ProviderApproval) -> bool {
        let (Some(signature), Some(edi_date)) = (&approval.signature, &approval.edi_date) else {
            return true;
        };
        let (Some(tid), Some(amount)) = (&approval.tid, approval.amount) else {
            return false;
        };
        let Some(expected) =
            approval_signature(self.config.secret_key.expose_secret(), tid, amount, edi_date)
        else {
            return false;
        };
        let valid: bool = expected
            .as_bytes()
            .ct_eq(signature.to_ascii_lowercase().as_bytes())
            .into();
        if !valid {
            tracing::warn!(tid = %tid, "Gateway response signature mismatch");
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn config(client_id: &str, secret: &str) -> GatewayConfig {
        GatewayConfig {
            client_id: client_id.to_string(),
            secret_key: Secret::new(secret.to_string()),
            api_base_url: "https://sandbox-api.example.com/".to_string(),
            timeout_seconds: 5,
        }
    }

    fn signed(secret: &str) -> ProviderApproval {
        ProviderApproval {
            result_code: "0000".to_string(),
            tid: Some("T1".to_string()),
            amount: Some(21_000),
            edi_date: Some("2026-10-17T10:00:00.000+0900".to_string()),
            signature: approval_signature(secret, "T1", 21_000, "2026-10-17T10:00:00.000+0900"),
            ..Default::default()
        }
    }

    #[test]
    fn configured_only_with_both_keys() {
        assert!(HttpPaymentGateway::new(config("ck", "sk")).unwrap().is_configured());
        assert!(!HttpPaymentGateway::new(config("", "sk")).unwrap().is_configured());
        assert!(!HttpPaymentGateway::new(config("ck", "")).unwrap().is_configured());
    }

    #[test]
    fn settlement_url_has_no_double_slash() {
        let gateway = HttpPaymentGateway::new(config("ck", "sk")).unwrap();
        assert_eq!(
            gateway.settlement_url("T1"),
            "https://sandbox-api.example.com/v1/payments/T1"
        );
    }

    #[test]
    fn signature_checked_when_present() {
        let gateway = HttpPaymentGateway::new(config("ck", "sk")).unwrap();
        assert!(gateway.verify_signature(&signed("sk")));
        assert!(!gateway.verify_signature(&signed("other")));

        let mut tampered = signed("sk");
        tampered.amount = Some(1);
        assert!(!gateway.verify_signature(&tampered));
    }

    #[test]
    fn unsigned_response_is_accepted() {
        let gateway = HttpPaymentGateway::new(config("ck", "sk")).unwrap();
        let approval = ProviderApproval {
            result_code: "0000".to_string(),
            ..Default::default()
        };
        assert!(gateway.verify_signature(&approval));
    }
}
