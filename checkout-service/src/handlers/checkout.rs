//! Checkout order creation and status polling.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    cart::{CartStore, MemoryCartPersistence},
    dtos::{CreateOrderRequest, CreateOrderResponse, OrderStatusResponse},
    error::CheckoutError,
    models::CheckoutRecord,
    services::metrics,
    AppState,
};

/// Freeze the submitted cart into a checkout order and register it for
/// settlement.
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    payload.validate()?;

    let mut cart = CartStore::load(MemoryCartPersistence::default());
    for item in payload.items {
        cart.add_or_replace(item).map_err(CheckoutError::from)?;
    }

    let order = state.builder.build_order(&cart).await?;
    let record = CheckoutRecord::new(
        order,
        Duration::minutes(state.config.checkout.order_ttl_minutes),
    );
    state
        .orders
        .insert(&record)
        .await
        .map_err(CheckoutError::from)?;
    metrics::record_order_created();

    tracing::info!(
        order_id = %record.order_id,
        amount = record.order.amount(),
        lines = record.order.lines().len(),
        "Checkout order created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id: record.order_id.clone(),
            amount: record.order.amount(),
            goods_name: record.order.goods_name().to_string(),
            return_url: record.order.return_url().to_string(),
            client_id: state.settlement.approval().client_id().to_string(),
            expires_at: record.expires_at,
        }),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatusResponse>, AppError> {
    let record = state
        .orders
        .get(&order_id)
        .await
        .map_err(CheckoutError::from)?
        .ok_or(CheckoutError::OrderNotFound(order_id))?;

    Ok(Json(OrderStatusResponse::from_record(record, Utc::now())))
}
