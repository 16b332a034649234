//! Second-leg settlement against the card gateway.

use std::sync::Arc;

use super::gateway::{GatewayError, PaymentGateway, ProviderApproval};
use crate::error::CheckoutError;
use crate::models::{ApprovedPayment, PaymentApprovalResult};

/// Result code the gateway uses for a successful settlement.
pub const SUCCESS_CODE: &str = "0000";
pub const SIGNATURE_MISMATCH_CODE: &str = "SIGNATURE_MISMATCH";
pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";
pub const INVALID_RESPONSE_CODE: &str = "INVALID_RESPONSE";
/// The provider approved an amount other than the frozen one.
pub const AMOUNT_MISMATCH_CODE: &str = "AMOUNT_MISMATCH";

const UNREACHABLE_MESSAGE: &str = "Payment provider is temporarily unavailable, please retry";

#[derive(Clone)]
pub struct PaymentApprovalService {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentApprovalService {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub fn client_id(&self) -> &str {
        self.gateway.client_id()
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_configured()
    }

    /// Settles `tid` for `amount` and normalizes the provider's answer.
    ///
    /// Missing input and missing credentials are errors; everything the
    /// provider says, or fails to say, is a [`PaymentApprovalResult`].
    pub async fn approve(
        &self,
        tid: &str,
        amount: u64,
    ) -> Result<PaymentApprovalResult, CheckoutError> {
        if tid.trim().is_empty() {
            return Err(CheckoutError::MissingParameter("tid"));
        }
        if amount == 0 {
            return Err(CheckoutError::MissingParameter("amount"));
        }
        if !self.gateway.is_configured() {
            tracing::error!("Payment approval requested but gateway credentials are missing");
            return Err(CheckoutError::NotConfigured);
        }

        match self.gateway.approve(tid, amount).await {
            Ok(approval) => Ok(self.normalize(tid, amount, approval)),
            Err(GatewayError::NotConfigured) => Err(CheckoutError::NotConfigured),
            Err(GatewayError::Transport(detail)) => {
                tracing::error!(tid, error = %detail, "Payment gateway unreachable");
                Ok(PaymentApprovalResult::unreachable(
                    NETWORK_ERROR_CODE,
                    UNREACHABLE_MESSAGE,
                ))
            }
            Err(GatewayError::InvalidResponse(detail)) => {
                tracing::error!(tid, error = %detail, "Payment gateway response unreadable");
                Ok(PaymentApprovalResult::unreachable(
                    INVALID_RESPONSE_CODE,
                    UNREACHABLE_MESSAGE,
                ))
            }
        }
    }

    fn normalize(&self, tid: &str, amount: u64, approval: ProviderApproval) -> PaymentApprovalResult {
        if approval.result_code != SUCCESS_CODE {
            tracing::warn!(
                tid,
                code = %approval.result_code,
                message = %approval.result_msg,
                "Payment declined by gateway"
            );
            return PaymentApprovalResult::declined(approval.result_code, approval.result_msg);
        }

        if !self.gateway.verify_signature(&approval) {
            return PaymentApprovalResult::declined(
                SIGNATURE_MISMATCH_CODE,
                "Payment response could not be verified",
            );
        }

        if let Some(reported) = approval.amount.filter(|reported| *reported != amount) {
            tracing::error!(tid, expected = amount, reported, "Gateway approved a different amount");
            return PaymentApprovalResult::declined(
                AMOUNT_MISMATCH_CODE,
                "Approved amount does not match the order",
            );
        }

        tracing::info!(tid, amount, "Payment approved");
        PaymentApprovalResult::Approved(ApprovedPayment {
            card: approval.card_descriptor(),
            tid: approval.tid.unwrap_or_else(|| tid.to_string()),
            order_id: approval.order_id.unwrap_or_default(),
            amount,
            approved_at: approval.paid_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::{MockPaymentGateway, MOCK_AMOUNT_MISMATCH_CODE};
    use async_trait::async_trait;

    fn service(gateway: Arc<MockPaymentGateway>) -> PaymentApprovalService {
        PaymentApprovalService::new(gateway)
    }

    #[tokio::test]
    async fn missing_inputs_are_client_errors() {
        let gateway = Arc::new(MockPaymentGateway::new());
        let svc = service(gateway.clone());

        assert!(matches!(
            svc.approve("", 100).await,
            Err(CheckoutError::MissingParameter("tid"))
        ));
        assert!(matches!(
            svc.approve("T1", 0).await,
            Err(CheckoutError::MissingParameter("amount"))
        ));
        assert_eq!(gateway.approve_calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_never_calls_provider() {
        let gateway = Arc::new(MockPaymentGateway::unconfigured());
        let svc = service(gateway.clone());

        assert!(matches!(
            svc.approve("T1", 100).await,
            Err(CheckoutError::NotConfigured)
        ));
        assert_eq!(gateway.approve_calls(), 0);
    }

    #[tokio::test]
    async fn success_is_normalized() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.authorize("T1", "ORD-1", 21_000);

        let result = service(gateway).approve("T1", 21_000).await.unwrap();
        match result {
            PaymentApprovalResult::Approved(payment) => {
                assert_eq!(payment.tid, "T1");
                assert_eq!(payment.order_id, "ORD-1");
                assert_eq!(payment.amount, 21_000);
                assert!(payment.card.is_some());
            }
            other => panic!("expected approval, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn decline_carries_provider_code() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.authorize("T1", "ORD-1", 21_000);

        let result = service(gateway).approve("T1", 20_000).await.unwrap();
        match result {
            PaymentApprovalResult::Declined(failure) => {
                assert_eq!(failure.code, MOCK_AMOUNT_MISMATCH_CODE)
            }
            other => panic!("expected decline, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_retryable_and_generic() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway.set_transport_failure(true);

        let result = service(gateway).approve("T1", 100).await.unwrap();
        assert!(!result.is_terminal());
        match result {
            PaymentApprovalResult::Unreachable(failure) => {
                assert_eq!(failure.code, NETWORK_ERROR_CODE);
                assert!(!failure.message.contains("connection refused"));
            }
            other => panic!("expected unreachable, got {:?}", other),
        }
    }

    struct FixedAmountGateway(u64);

    #[async_trait]
    impl PaymentGateway for FixedAmountGateway {
        fn is_configured(&self) -> bool {
            true
        }

        fn client_id(&self) -> &str {
            "fixed"
        }

        async fn approve(&self, tid: &str, _amount: u64) -> Result<ProviderApproval, GatewayError> {
            Ok(ProviderApproval {
                result_code: SUCCESS_CODE.to_string(),
                result_msg: "Approved".to_string(),
                tid: Some(tid.to_string()),
                amount: Some(self.0),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn reported_amount_must_equal_requested() {
        let short = PaymentApprovalService::new(Arc::new(FixedAmountGateway(100)));
        match short.approve("T1", 21_000).await.unwrap() {
            PaymentApprovalResult::Declined(failure) => {
                assert_eq!(failure.code, AMOUNT_MISMATCH_CODE)
            }
            other => panic!("expected decline, got {:?}", other),
        }

        let exact = PaymentApprovalService::new(Arc::new(FixedAmountGateway(21_000)));
        assert!(exact.approve("T1", 21_000).await.unwrap().is_success());
    }
}
