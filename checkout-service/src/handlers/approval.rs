use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::{
    dtos::{ApiResponse, ApprovalData, ApproveRequest},
    error::CheckoutError,
    models::PaymentApprovalResult,
    AppState,
};

type ApprovalReply = (StatusCode, Json<ApiResponse<ApprovalData>>);

fn reply(status: StatusCode, body: ApiResponse<ApprovalData>) -> ApprovalReply {
    (status, Json(body))
}

fn invalid(message: &str) -> ApprovalReply {
    reply(
        StatusCode::BAD_REQUEST,
        ApiResponse::fail("INVALID_REQUEST", message),
    )
}

/// Settle a checkout order after the client callback page received the
/// provider's authorization.
///
/// Provider declines are a normal `200` answer with `success: false`.
pub async fn approve_payment(
    State(state): State<AppState>,
    payload: Result<Json<ApproveRequest>, JsonRejection>,
) -> ApprovalReply {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Approval request body rejected");
            return invalid("Request body must be JSON with tid, amount and orderId");
        }
    };

    let Some(tid) = request.tid.filter(|t| !t.trim().is_empty()) else {
        return invalid("tid is required");
    };
    let Some(amount) = request.amount else {
        return invalid("amount is required");
    };
    let Some(amount) = amount.value().filter(|a| *a > 0) else {
        return invalid("amount must be a positive integer");
    };
    let Some(order_id) = request.order_id.filter(|o| !o.trim().is_empty()) else {
        return invalid("orderId is required");
    };

    match state.settlement.settle(&order_id, &tid, amount).await {
        Ok(outcome) => match outcome.result {
            PaymentApprovalResult::Approved(payment) => reply(
                StatusCode::OK,
                ApiResponse::ok(ApprovalData {
                    tid: payment.tid,
                    order_id: payment.order_id,
                    amount: payment.amount,
                    card: payment.card,
                    approved_at: payment.approved_at,
                    reservations_materialized: outcome.reservations_materialized,
                }),
            ),
            PaymentApprovalResult::Declined(failure) => reply(
                StatusCode::OK,
                ApiResponse::fail(failure.code, failure.message),
            ),
            PaymentApprovalResult::Unreachable(failure) => reply(
                StatusCode::BAD_GATEWAY,
                ApiResponse::fail(failure.code, failure.message),
            ),
        },
        Err(CheckoutError::Validation(message)) => invalid(&message),
        Err(e @ CheckoutError::MissingParameter(_)) => invalid(&e.to_string()),
        Err(CheckoutError::OrderNotFound(_)) => reply(
            StatusCode::BAD_REQUEST,
            ApiResponse::fail("ORDER_NOT_FOUND", "Checkout order not found"),
        ),
        Err(CheckoutError::NotConfigured) => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::fail("CONFIGURATION_ERROR", "Payment is currently unavailable"),
        ),
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "Settlement failed");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::fail("INTERNAL_ERROR", "Payment could not be processed"),
            )
        }
    }
}
