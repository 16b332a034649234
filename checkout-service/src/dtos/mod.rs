use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{CartItem, CheckoutRecord, CheckoutState, PaymentApprovalResult};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<CartItem>,
}

/// What the payment widget needs to start the hosted authorization.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub amount: u64,
    pub goods_name: String,
    pub return_url: String,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub amount: u64,
    pub goods_name: String,
    pub state: CheckoutState,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PaymentApprovalResult>,
    pub reservations_materialized: bool,
}

impl OrderStatusResponse {
    pub fn from_record(record: CheckoutRecord, now: DateTime<Utc>) -> Self {
        Self {
            state: record.effective_state(now),
            order_id: record.order_id,
            amount: record.order.amount(),
            goods_name: record.order.goods_name().to_string(),
            expires_at: record.expires_at,
            result: record.result,
            reservations_materialized: record.reservations_materialized,
        }
    }
}

/// Amount as the client page sends it: a JSON number or the raw `amt` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountParam {
    Number(u64),
    Text(String),
}

impl AmountParam {
    pub fn value(&self) -> Option<u64> {
        match self {
            AmountParam::Number(n) => Some(*n),
            AmountParam::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Every field is optional so a missing one can be reported by name.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub tid: Option<String>,
    pub amount: Option<AmountParam>,
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalData {
    pub tid: String,
    pub order_id: String,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    pub reservations_materialized: bool,
}

/// `{ success, data? | error?, code? }` envelope of the approval endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn fail(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code.into()),
        }
    }
}
