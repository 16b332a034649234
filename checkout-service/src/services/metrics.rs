use anyhow::{bail, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
static CHECKOUT_ORDERS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
static PAYMENT_APPROVALS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static RESERVATIONS_MATERIALIZED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Installs the HTTP metrics recorder and registers the checkout counters.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    if METRICS_HANDLE.set(handle).is_err() {
        bail!("metrics recorder already initialized");
    }
    init_registry()
}

/// Registers the checkout counters only. Safe to call more than once.
pub fn init_registry() -> Result<()> {
    if PROMETHEUS_REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let orders = IntCounter::with_opts(Opts::new(
        "checkout_orders_total",
        "Checkout orders created",
    ))?;
    let approvals = IntCounterVec::new(
        Opts::new(
            "payment_approvals_total",
            "Payment settlement calls by normalized result",
        ),
        &["result"],
    )?;
    let materialized = IntCounterVec::new(
        Opts::new(
            "reservations_materialized_total",
            "Reservation materialization attempts by outcome",
        ),
        &["outcome"],
    )?;

    registry.register(Box::new(orders.clone()))?;
    registry.register(Box::new(approvals.clone()))?;
    registry.register(Box::new(materialized.clone()))?;

    // Losing a race here only means another caller registered first.
    let _ = CHECKOUT_ORDERS_TOTAL.set(orders);
    let _ = PAYMENT_APPROVALS_TOTAL.set(approvals);
    let _ = RESERVATIONS_MATERIALIZED_TOTAL.set(materialized);
    let _ = PROMETHEUS_REGISTRY.set(registry);
    Ok(())
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&registry.gather(), &mut buffer).is_ok() {
            if let Ok(custom) = String::from_utf8(buffer) {
                output.push_str(&custom);
            }
        }
    }

    output
}

pub fn record_order_created() {
    if let Some(counter) = CHECKOUT_ORDERS_TOTAL.get() {
        counter.inc();
    }
}

/// `result` is one of `approved`, `declined`, `unreachable`.
pub fn record_approval(result: &str) {
    if let Some(counter) = PAYMENT_APPROVALS_TOTAL.get() {
        counter.with_label_values(&[result]).inc();
    }
}

pub fn record_materialization(outcome: &str) {
    if let Some(counter) = RESERVATIONS_MATERIALIZED_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_after_registry_init() {
        init_registry().unwrap();
        init_registry().unwrap();
        record_order_created();
        record_approval("approved");
        record_materialization("created");

        let rendered = get_metrics();
        assert!(rendered.contains("checkout_orders_total"));
        assert!(rendered.contains("payment_approvals_total{result=\"approved\"}"));
        assert!(rendered.contains("reservations_materialized_total{outcome=\"created\"}"));
    }
}
