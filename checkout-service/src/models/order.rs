use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::cart::CartItem;
use super::payment::PaymentApprovalResult;

/// Frozen, provider-facing representation of one checkout attempt.
///
/// Fields are private: an order is created by the session builder and never
/// mutated afterwards. `amount` is the value forwarded at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOrder {
    order_id: String,
    amount: u64,
    goods_name: String,
    return_url: String,
    lines: Vec<CartItem>,
    created_at: DateTime<Utc>,
}

impl CheckoutOrder {
    pub(crate) fn new(
        order_id: String,
        amount: u64,
        goods_name: String,
        return_url: String,
        lines: Vec<CartItem>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            amount,
            goods_name,
            return_url,
            lines,
            created_at,
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn goods_name(&self) -> &str {
        &self.goods_name
    }

    pub fn return_url(&self) -> &str {
        &self.return_url
    }

    /// Snapshot of the cart lines the amount was computed from.
    pub fn lines(&self) -> &[CartItem] {
        &self.lines
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Settlement progress of a checkout order.
///
/// `AwaitingRedirect -> CallbackReceived -> Approved | Declined`, with
/// `AwaitingRedirect -> Expired` when the customer never comes back.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutState {
    AwaitingRedirect,
    CallbackReceived,
    Approved,
    Declined,
    Expired,
}

impl CheckoutState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CheckoutState::Approved | CheckoutState::Declined | CheckoutState::Expired
        )
    }

    pub fn can_transition_to(self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (AwaitingRedirect, CallbackReceived)
                | (AwaitingRedirect, Expired)
                // Transport failures leave the order here; a retry re-enters.
                | (CallbackReceived, CallbackReceived)
                | (CallbackReceived, Approved)
                | (CallbackReceived, Declined)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutState::AwaitingRedirect => "AWAITING_REDIRECT",
            CheckoutState::CallbackReceived => "CALLBACK_RECEIVED",
            CheckoutState::Approved => "APPROVED",
            CheckoutState::Declined => "DECLINED",
            CheckoutState::Expired => "EXPIRED",
        }
    }
}

/// Persisted checkout order together with its settlement progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRecord {
    #[serde(rename = "_id")]
    pub order_id: String,
    pub order: CheckoutOrder,
    pub state: CheckoutState,
    /// Provider transaction id, bound on the first settlement attempt.
    /// Omitted until bound so the unique sparse index skips unbound orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    /// Terminal approval result, stored so repeated calls see the same answer.
    pub result: Option<PaymentApprovalResult>,
    #[serde(default)]
    pub reservations_materialized: bool,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutRecord {
    pub fn new(order: CheckoutOrder, ttl: Duration) -> Self {
        let created_at = order.created_at();
        Self {
            order_id: order.order_id().to_string(),
            order,
            state: CheckoutState::AwaitingRedirect,
            tid: None,
            result: None,
            reservations_materialized: false,
            expires_at: created_at + ttl,
            updated_at: created_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.state == CheckoutState::AwaitingRedirect && now >= self.expires_at
    }

    /// State as a status poll should see it, counting a lapsed TTL as expired.
    pub fn effective_state(&self, now: DateTime<Utc>) -> CheckoutState {
        if self.is_expired_at(now) {
            CheckoutState::Expired
        } else {
            self.state
        }
    }

    /// Moves to `next`, refusing transitions the state machine does not allow.
    pub fn transition(&mut self, next: CheckoutState, now: DateTime<Utc>) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.updated_at = now;
        true
    }
}
