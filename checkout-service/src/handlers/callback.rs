//! Provider return URL.
//!
//! The provider posts the authorization result here after the hosted flow.
//! This handler settles nothing and stores nothing: it re-encodes the fields
//! as a query string and sends the browser on to the client callback page.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, RawQuery, State},
    response::Redirect,
};

use crate::{
    models::{PaymentAuthorization, CALLBACK_ERROR_CODE},
    AppState,
};

const UNREADABLE_CALLBACK: &str = "Payment response could not be read";

pub async fn callback_post(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Redirect {
    let auth = match body {
        Ok(bytes) => parse_authorization(&bytes),
        Err(e) => {
            tracing::warn!(error = %e, "Payment callback body unreadable");
            PaymentAuthorization::error(UNREADABLE_CALLBACK)
        }
    };
    redirect_to_client(&state.config.checkout.client_callback_url, &auth)
}

pub async fn callback_get(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Redirect {
    let auth = parse_authorization(query.unwrap_or_default().as_bytes());
    redirect_to_client(&state.config.checkout.client_callback_url, &auth)
}

/// Keeps the first value of every known field. A repeated field or a missing
/// `authResultCode` marks the callback as an error without dropping the rest.
fn parse_authorization(raw: &[u8]) -> PaymentAuthorization {
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_bytes(raw) {
        Ok(pairs) => pairs,
        Err(e) => {
            tracing::warn!(error = %e, "Payment callback malformed");
            return PaymentAuthorization::error(UNREADABLE_CALLBACK);
        }
    };

    let mut auth = PaymentAuthorization::default();
    let mut repeated = Vec::new();
    for (name, value) in pairs {
        let Some(slot) = auth.field_mut(&name) else {
            continue;
        };
        if slot.is_some() {
            repeated.push(name);
        } else {
            *slot = Some(value);
        }
    }

    if !repeated.is_empty() || auth.auth_result_code.is_none() {
        tracing::warn!(
            order_id = auth.order_id.as_deref().unwrap_or("-"),
            tid = auth.tid.as_deref().unwrap_or("-"),
            repeated = ?repeated,
            "Payment callback incomplete or ambiguous"
        );
        auth.mark_error(UNREADABLE_CALLBACK);
        return auth;
    }

    tracing::info!(
        order_id = auth.order_id.as_deref().unwrap_or("-"),
        tid = auth.tid.as_deref().unwrap_or("-"),
        code = auth.auth_result_code.as_deref().unwrap_or("-"),
        "Payment callback received"
    );
    auth
}

fn redirect_to_client(base: &str, auth: &PaymentAuthorization) -> Redirect {
    let query = serde_urlencoded::to_string(auth).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode payment callback");
        format!("authResultCode={}", CALLBACK_ERROR_CODE)
    });
    let separator = if base.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{}{}{}", base, separator, query))
}
