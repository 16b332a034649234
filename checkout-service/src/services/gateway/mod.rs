//! Card payment gateway port.
//!
//! The provider's hosted authorization flow happens in the customer's browser;
//! the server only ever talks to the provider for the second-leg settlement.

mod http;
mod mock;

pub use http::{approval_signature, HttpPaymentGateway};
pub use mock::{
    MockPaymentGateway, MOCK_AMOUNT_MISMATCH_CODE, MOCK_CLIENT_ID, MOCK_UNKNOWN_TID_CODE,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway credentials are not configured")]
    NotConfigured,

    #[error("Payment gateway unreachable: {0}")]
    Transport(String),

    #[error("Payment gateway returned an unreadable response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCard {
    #[serde(default)]
    pub card_name: Option<String>,
    #[serde(default)]
    pub card_num: Option<String>,
}

/// Settlement response as the provider sends it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderApproval {
    pub result_code: String,
    #[serde(default)]
    pub result_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<ProviderCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edi_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ProviderApproval {
    /// Human-readable card descriptor, e.g. `"Shinhan 5365-****-****-1234"`.
    pub fn card_descriptor(&self) -> Option<String> {
        let card = self.card.as_ref()?;
        match (&card.card_name, &card.card_num) {
            (Some(name), Some(num)) => Some(format!("{} {}", name, num)),
            (Some(name), None) => Some(name.clone()),
            (None, Some(num)) => Some(num.clone()),
            (None, None) => None,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Whether both the client key and secret key are present.
    fn is_configured(&self) -> bool;

    /// Public client key handed to the payment widget.
    fn client_id(&self) -> &str;

    /// Settles the authorized transaction `tid` for `amount`.
    ///
    /// Provider declines come back as `Ok` with a non-success result code.
    async fn approve(&self, tid: &str, amount: u64) -> Result<ProviderApproval, GatewayError>;

    /// Whether `approval` carries a valid provider signature. Responses
    /// without signature material are accepted.
    fn verify_signature(&self, _approval: &ProviderApproval) -> bool {
        true
    }
}
