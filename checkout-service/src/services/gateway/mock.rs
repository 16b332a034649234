use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{GatewayError, PaymentGateway, ProviderApproval, ProviderCard};

pub const MOCK_CLIENT_ID: &str = "mock-client-key";

/// Code the mock returns for an unknown transaction.
pub const MOCK_UNKNOWN_TID_CODE: &str = "A118";
/// Code the mock returns when the settled amount differs from the authorized one.
pub const MOCK_AMOUNT_MISMATCH_CODE: &str = "A245";

/// In-process gateway for local runs and tests.
///
/// Behaves like the provider: settlement is idempotent per tid and rejects an
/// amount that differs from what the customer authorized.
pub struct MockPaymentGateway {
    client_id: String,
    configured: bool,
    authorizations: DashMap<String, (String, u64)>,
    settled: DashMap<String, ProviderApproval>,
    fail_transport: AtomicBool,
    approve_calls: AtomicUsize,
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self {
            client_id: MOCK_CLIENT_ID.to_string(),
            configured: true,
            authorizations: DashMap::new(),
            settled: DashMap::new(),
            fail_transport: AtomicBool::new(false),
            approve_calls: AtomicUsize::new(0),
        }
    }

    /// A gateway with no credentials, as in an unconfigured deployment.
    pub fn unconfigured() -> Self {
        Self {
            client_id: String::new(),
            configured: false,
            ..Self::new()
        }
    }

    /// Records a completed hosted authorization for `tid`.
    pub fn authorize(&self, tid: &str, order_id: &str, amount: u64) {
        self.authorizations
            .insert(tid.to_string(), (order_id.to_string(), amount));
    }

    pub fn set_transport_failure(&self, failing: bool) {
        self.fail_transport.store(failing, Ordering::SeqCst);
    }

    pub fn approve_calls(&self) -> usize {
        self.approve_calls.load(Ordering::SeqCst)
    }

    fn decline(tid: &str, code: &str, message: &str) -> ProviderApproval {
        ProviderApproval {
            result_code: code.to_string(),
            result_msg: message.to_string(),
            tid: Some(tid.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn approve(&self, tid: &str, amount: u64) -> Result<ProviderApproval, GatewayError> {
        self.approve_calls.fetch_add(1, Ordering::SeqCst);

        if !self.configured {
            return Err(GatewayError::NotConfigured);
        }
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }

        let Some((order_id, authorized)) = self.authorizations.get(tid).map(|a| a.value().clone())
        else {
            return Ok(Self::decline(tid, MOCK_UNKNOWN_TID_CODE, "Transaction not found"));
        };
        if authorized != amount {
            return Ok(Self::decline(
                tid,
                MOCK_AMOUNT_MISMATCH_CODE,
                "Amount does not match the authorized amount",
            ));
        }

        let approval = self
            .settled
            .entry(tid.to_string())
            .or_insert_with(|| ProviderApproval {
                result_code: "0000".to_string(),
                result_msg: "Approved".to_string(),
                tid: Some(tid.to_string()),
                order_id: Some(order_id),
                amount: Some(amount),
                card: Some(ProviderCard {
                    card_name: Some("Mock Card".to_string()),
                    card_num: Some("1234-****-****-5678".to_string()),
                }),
                paid_at: Some(Utc::now().to_rfc3339()),
                edi_date: None,
                signature: None,
            })
            .value()
            .clone();
        Ok(approval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeat_settlement_returns_same_approval() {
        let gateway = MockPaymentGateway::new();
        gateway.authorize("T1", "ORD-1", 21_000);

        let first = gateway.approve("T1", 21_000).await.unwrap();
        let second = gateway.approve("T1", 21_000).await.unwrap();
        assert_eq!(first.result_code, "0000");
        assert_eq!(first, second);
        assert_eq!(gateway.approve_calls(), 2);
    }

    #[tokio::test]
    async fn amount_mismatch_declines() {
        let gateway = MockPaymentGateway::new();
        gateway.authorize("T1", "ORD-1", 21_000);

        let approval = gateway.approve("T1", 20_000).await.unwrap();
        assert_eq!(approval.result_code, MOCK_AMOUNT_MISMATCH_CODE);
    }

    #[tokio::test]
    async fn unconfigured_refuses() {
        let gateway = MockPaymentGateway::unconfigured();
        assert!(matches!(
            gateway.approve("T1", 1).await,
            Err(GatewayError::NotConfigured)
        ));
    }
}
