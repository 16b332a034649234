use serde::{Deserialize, Serialize};

/// Result code the callback carries when the handler itself failed.
pub const CALLBACK_ERROR_CODE: &str = "ERROR";

/// Authorization parameters the provider posts back after the hosted flow.
///
/// Untrusted: carried to the client verbatim and never used to move money.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_result_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_result_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl PaymentAuthorization {
    pub fn error(message: &str) -> Self {
        let mut auth = Self::default();
        auth.mark_error(message);
        auth
    }

    /// Flags the callback as failed, keeping every other field.
    pub fn mark_error(&mut self, message: &str) {
        self.auth_result_code = Some(CALLBACK_ERROR_CODE.to_string());
        self.auth_result_msg = Some(message.to_string());
    }

    /// Slot for a wire field name. Unknown names are `None`.
    pub fn field_mut(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "authResultCode" => Some(&mut self.auth_result_code),
            "authResultMsg" => Some(&mut self.auth_result_msg),
            "tid" => Some(&mut self.tid),
            "orderId" => Some(&mut self.order_id),
            "amt" => Some(&mut self.amt),
            "signature" => Some(&mut self.signature),
            "authToken" => Some(&mut self.auth_token),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedPayment {
    pub tid: String,
    pub order_id: String,
    pub amount: u64,
    pub card: Option<String>,
    pub approved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailure {
    pub code: String,
    pub message: String,
}

/// Normalized outcome of a settlement call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentApprovalResult {
    Approved(ApprovedPayment),
    /// The provider answered and said no. Terminal.
    Declined(PaymentFailure),
    /// The provider could not be reached or answered garbage. The user may retry.
    Unreachable(PaymentFailure),
}

impl PaymentApprovalResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PaymentApprovalResult::Approved(_))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentApprovalResult::Unreachable(_))
    }

    pub fn declined(code: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentApprovalResult::Declined(PaymentFailure {
            code: code.into(),
            message: message.into(),
        })
    }

    pub fn unreachable(code: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentApprovalResult::Unreachable(PaymentFailure {
            code: code.into(),
            message: message.into(),
        })
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            PaymentApprovalResult::Approved(_) => "approved",
            PaymentApprovalResult::Declined(_) => "declined",
            PaymentApprovalResult::Unreachable(_) => "unreachable",
        }
    }
}
