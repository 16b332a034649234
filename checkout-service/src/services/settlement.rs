//! Settlement of a checkout order: the server-side half of the two-phase
//! payment.
//!
//! The client reports `(order_id, tid, amount)` after the provider redirect.
//! Only the tid and the order's frozen amount are sent to the provider; the
//! client amount is merely checked against the frozen one.

use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::approval::PaymentApprovalService;
use super::materializer::ReservationMaterializer;
use super::metrics;
use super::repository::CheckoutOrderStore;
use crate::error::CheckoutError;
use crate::models::{CheckoutRecord, CheckoutState, PaymentApprovalResult};

pub const CHECKOUT_EXPIRED_CODE: &str = "CHECKOUT_EXPIRED";
/// The provider settled the tid for some other order.
pub const ORDER_MISMATCH_CODE: &str = "ORDER_MISMATCH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub result: PaymentApprovalResult,
    pub reservations_materialized: bool,
}

pub struct SettlementService {
    orders: Arc<dyn CheckoutOrderStore>,
    approval: PaymentApprovalService,
    materializer: Arc<dyn ReservationMaterializer>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    materialize_retry: Duration,
}

impl SettlementService {
    pub fn new(
        orders: Arc<dyn CheckoutOrderStore>,
        approval: PaymentApprovalService,
        materializer: Arc<dyn ReservationMaterializer>,
        materialize_retry: Duration,
    ) -> Self {
        Self {
            orders,
            approval,
            materializer,
            locks: DashMap::new(),
            materialize_retry,
        }
    }

    pub fn approval(&self) -> &PaymentApprovalService {
        &self.approval
    }

    /// Settles `order_id` with the provider transaction `tid`.
    ///
    /// Repeated and concurrent calls are safe: a terminal result is stored
    /// on the order and returned as-is, and an approved order is never sent
    /// to the provider again. A tid settles at most one order; a provider
    /// approval naming another order is declined with [`ORDER_MISMATCH_CODE`].
    pub async fn settle(
        &self,
        order_id: &str,
        tid: &str,
        amount: u64,
    ) -> Result<SettlementOutcome, CheckoutError> {
        if order_id.trim().is_empty() {
            return Err(CheckoutError::MissingParameter("orderId"));
        }
        if tid.trim().is_empty() {
            return Err(CheckoutError::MissingParameter("tid"));
        }
        if amount == 0 {
            return Err(CheckoutError::MissingParameter("amount"));
        }

        let lock = self
            .locks
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let outcome = {
            let _guard = lock.lock().await;
            self.settle_locked(order_id, tid, amount).await
        };
        drop(lock);
        self.locks
            .remove_if(order_id, |_, lock| Arc::strong_count(lock) == 1);

        outcome
    }

    async fn settle_locked(
        &self,
        order_id: &str,
        tid: &str,
        amount: u64,
    ) -> Result<SettlementOutcome, CheckoutError> {
        let mut record = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound(order_id.to_string()))?;

        let now = Utc::now();
        if record.is_expired_at(now) {
            tracing::info!(order_id, "Settlement attempted on expired checkout");
            let result = PaymentApprovalResult::declined(
                CHECKOUT_EXPIRED_CODE,
                "Checkout session expired, please start again",
            );
            record.transition(CheckoutState::Expired, now);
            record.result = Some(result.clone());
            self.orders.save(&record).await?;
            return Ok(SettlementOutcome {
                result,
                reservations_materialized: false,
            });
        }
        if record.state == CheckoutState::Expired {
            return Ok(self.stored_outcome(&record));
        }

        if amount != record.order.amount() {
            tracing::warn!(
                order_id,
                expected = record.order.amount(),
                received = amount,
                "Settlement amount does not match the order"
            );
            return Err(CheckoutError::validation(
                "Amount does not match the checkout order",
            ));
        }
        if let Some(bound) = record.tid.as_deref() {
            if bound != tid {
                tracing::warn!(order_id, bound, received = tid, "Settlement tid mismatch");
                return Err(CheckoutError::validation(
                    "Transaction does not belong to this checkout order",
                ));
            }
        } else if let Some(owner) = self.orders.find_by_tid(tid).await? {
            if owner.order_id != record.order_id {
                tracing::warn!(
                    order_id,
                    owner = %owner.order_id,
                    tid,
                    "Transaction already bound to another order"
                );
                return Err(CheckoutError::validation(
                    "Transaction already belongs to another checkout order",
                ));
            }
        }

        match record.state {
            CheckoutState::Approved => {
                if !record.reservations_materialized {
                    self.materialize(&mut record).await?;
                }
                return Ok(self.stored_outcome(&record));
            }
            CheckoutState::Declined => return Ok(self.stored_outcome(&record)),
            _ => {}
        }

        if !self.approval.is_configured() {
            return Err(CheckoutError::NotConfigured);
        }

        record.tid = Some(tid.to_string());
        record.transition(CheckoutState::CallbackReceived, now);
        self.orders.save(&record).await?;

        let result = self.approval.approve(tid, record.order.amount()).await?;

        // Left in CallbackReceived; the user may retry.
        if !result.is_terminal() {
            metrics::record_approval(result.status_label());
            return Ok(SettlementOutcome {
                result,
                reservations_materialized: false,
            });
        }

        let result = match result {
            PaymentApprovalResult::Approved(mut payment) => {
                if payment.order_id.is_empty() {
                    payment.order_id = record.order_id.clone();
                }
                if payment.order_id == record.order_id {
                    PaymentApprovalResult::Approved(payment)
                } else {
                    tracing::error!(
                        order_id,
                        provider_order_id = %payment.order_id,
                        tid,
                        "Provider settled the transaction for a different order"
                    );
                    // Release the tid for the order it really belongs to.
                    record.tid = None;
                    PaymentApprovalResult::declined(
                        ORDER_MISMATCH_CODE,
                        "Transaction does not belong to this checkout order",
                    )
                }
            }
            other => other,
        };
        metrics::record_approval(result.status_label());

        let next = if result.is_success() {
            CheckoutState::Approved
        } else {
            CheckoutState::Declined
        };

        record.transition(next, Utc::now());
        record.result = Some(result);
        self.orders.save(&record).await?;

        if record.state == CheckoutState::Approved {
            self.materialize(&mut record).await?;
        }
        Ok(self.stored_outcome(&record))
    }

    fn stored_outcome(&self, record: &CheckoutRecord) -> SettlementOutcome {
        SettlementOutcome {
            result: record.result.clone().unwrap_or_else(|| {
                PaymentApprovalResult::declined(record.state.as_str(), "No settlement result")
            }),
            reservations_materialized: record.reservations_materialized,
        }
    }

    /// Writes reservations for an approved record, retrying with backoff.
    ///
    /// Giving up is not an error: the record stays approved and the next
    /// settle call tries again.
    async fn materialize(&self, record: &mut CheckoutRecord) -> Result<(), CheckoutError> {
        let Some(PaymentApprovalResult::Approved(payment)) = record.result.clone() else {
            return Ok(());
        };

        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(self.materialize_retry),
            ..Default::default()
        };
        let order = &record.order;
        let attempt = retry(policy, || async {
            self.materializer
                .confirm(order, &payment)
                .await
                .map_err(|e| {
                    tracing::warn!(order_id = %order.order_id(), error = %e, "Reservation write failed, retrying");
                    backoff::Error::transient(e)
                })
        })
        .await;

        match attempt {
            Ok(outcome) => {
                metrics::record_materialization(outcome.label());
                record.reservations_materialized = true;
                record.updated_at = Utc::now();
                self.orders.save(record).await?;
            }
            Err(e) => {
                metrics::record_materialization("failed");
                tracing::error!(
                    order_id = %record.order_id,
                    error = %e,
                    "Reservations not materialized; will retry on next settlement call"
                );
            }
        }
        Ok(())
    }
}
