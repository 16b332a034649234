use anyhow::anyhow;
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::middleware::{
    metrics::metrics_middleware,
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::{Config, StorageBackend};
use crate::handlers;
use crate::services::{
    CheckoutOrderStore, CheckoutSessionBuilder, HttpPaymentGateway, InMemoryCheckoutOrderStore,
    InMemoryPolicySource, InMemoryProductCatalog, InMemoryReservationMaterializer,
    MongoCheckoutOrderStore, MongoPolicySource, MongoProductCatalog,
    MongoReservationMaterializer, PaymentApprovalService, PaymentGateway, PolicySource,
    ProductCatalog, ReservationMaterializer, ReservationPolicyService, SettlementService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub builder: Arc<CheckoutSessionBuilder>,
    pub orders: Arc<dyn CheckoutOrderStore>,
    pub settlement: Arc<SettlementService>,
}

/// External systems the checkout pipeline talks to.
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub orders: Arc<dyn CheckoutOrderStore>,
    pub materializer: Arc<dyn ReservationMaterializer>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub policy_source: Arc<dyn PolicySource>,
}

impl Collaborators {
    pub async fn mongo(config: &Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.storage.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.storage.db_name);

        let orders = MongoCheckoutOrderStore::new(&db);
        orders.init_indexes().await?;
        let materializer = MongoReservationMaterializer::new(&db);
        materializer.init_indexes().await?;

        Ok(Self {
            gateway: Arc::new(HttpPaymentGateway::new(config.gateway.clone())?),
            orders: Arc::new(orders),
            materializer: Arc::new(materializer),
            catalog: Arc::new(MongoProductCatalog::new(&db)),
            policy_source: Arc::new(MongoPolicySource::new(&db)),
        })
    }

    /// Process-local stores with the real gateway.
    pub fn in_memory(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            gateway: Arc::new(HttpPaymentGateway::new(config.gateway.clone())?),
            orders: Arc::new(InMemoryCheckoutOrderStore::new()),
            materializer: Arc::new(InMemoryReservationMaterializer::new()),
            catalog: Arc::new(InMemoryProductCatalog::from_listing(
                &config.storage.memory_products,
            )?),
            policy_source: Arc::new(InMemoryPolicySource::default()),
        })
    }
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let collaborators = match config.storage.backend {
            StorageBackend::Mongodb => Collaborators::mongo(&config).await?,
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; orders are lost on restart");
                Collaborators::in_memory(&config)?
            }
        };
        Self::with_collaborators(config, collaborators).await
    }

    pub async fn with_collaborators(
        config: Config,
        collaborators: Collaborators,
    ) -> anyhow::Result<Self> {
        let utc_offset = config
            .checkout
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| anyhow!("CHECKOUT_UTC_OFFSET_HOURS is out of range"))?;

        let policy = Arc::new(ReservationPolicyService::new(
            collaborators.policy_source,
            Duration::from_secs(config.policy.cache_ttl_seconds),
        ));
        let builder = Arc::new(CheckoutSessionBuilder::new(
            policy,
            collaborators.catalog,
            config.checkout.return_url(),
            utc_offset,
        ));

        let approval = PaymentApprovalService::new(collaborators.gateway);
        if approval.is_configured() {
            tracing::info!("Payment gateway configured");
        } else {
            tracing::warn!("Payment gateway credentials not configured - approvals will fail");
        }

        let settlement = Arc::new(SettlementService::new(
            collaborators.orders.clone(),
            approval,
            collaborators.materializer,
            Duration::from_secs(config.checkout.materialize_retry_seconds),
        ));

        let state = AppState {
            config: config.clone(),
            builder,
            orders: collaborators.orders,
            settlement,
        };

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router: router(state),
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        tracing::info!("Listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    pub fn http_port(&self) -> u16 {
        self.port
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route("/checkout/orders", post(handlers::checkout::create_order))
        .route(
            "/checkout/orders/:order_id",
            get(handlers::checkout::get_order),
        )
        .route(
            "/payments/callback",
            post(handlers::callback::callback_post).get(handlers::callback::callback_get),
        )
        .route(
            "/payments/approve",
            post(handlers::approval::approve_payment),
        )
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
