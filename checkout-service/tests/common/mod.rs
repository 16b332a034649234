#![allow(dead_code)]

use chrono::{Duration, NaiveDate, Utc};
use checkout_service::config::{
    CheckoutConfig, Config, GatewayConfig, PolicyConfig, ServerConfig, StorageBackend,
    StorageConfig,
};
use checkout_service::services::{
    HttpPaymentGateway, InMemoryCheckoutOrderStore, InMemoryPolicySource, InMemoryProductCatalog,
    InMemoryReservationMaterializer, MockPaymentGateway, PaymentGateway,
};
use checkout_service::{Application, Collaborators};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;

pub const CLIENT_CALLBACK_URL: &str = "/checkout/callback";

pub struct TestApp {
    pub address: String,
    pub http_port: u16,
    pub client: reqwest::Client,
    pub gateway: Arc<MockPaymentGateway>,
    pub orders: Arc<InMemoryCheckoutOrderStore>,
    pub reservations: Arc<InMemoryReservationMaterializer>,
    pub policy: Arc<InMemoryPolicySource>,
}

pub fn test_config(gateway_url: &str) -> Config {
    Config {
        common: service_core::config::Config::default(),
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            url: Secret::new("mongodb://unused".to_string()),
            db_name: "checkout_test".to_string(),
            memory_products: String::new(),
        },
        gateway: GatewayConfig {
            client_id: "test-client-key".to_string(),
            secret_key: Secret::new("test-secret-key".to_string()),
            api_base_url: gateway_url.to_string(),
            timeout_seconds: 5,
        },
        checkout: CheckoutConfig {
            public_base_url: "http://shop.test".to_string(),
            client_callback_url: CLIENT_CALLBACK_URL.to_string(),
            order_ttl_minutes: 30,
            utc_offset_hours: 9,
            materialize_retry_seconds: 1,
        },
        policy: PolicyConfig {
            cache_ttl_seconds: 1800,
        },
        service_name: "checkout-service-test".to_string(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        let gateway = Arc::new(MockPaymentGateway::new());
        Self::spawn_with_gateway(gateway.clone(), gateway, test_config("http://unused")).await
    }

    /// App talking to a real HTTP gateway at `gateway_url` (a wiremock server).
    pub async fn spawn_with_http_gateway(gateway_url: &str) -> Self {
        let config = test_config(gateway_url);
        let gateway = HttpPaymentGateway::new(config.gateway.clone())
            .expect("Failed to build HTTP gateway");
        Self::spawn_with_gateway(Arc::new(gateway), Arc::new(MockPaymentGateway::new()), config)
            .await
    }

    /// `gateway` serves the app; `mock` is kept for assertions.
    pub async fn spawn_with_gateway(
        gateway: Arc<dyn PaymentGateway>,
        mock: Arc<MockPaymentGateway>,
        config: Config,
    ) -> Self {
        let orders = Arc::new(InMemoryCheckoutOrderStore::new());
        let reservations = Arc::new(InMemoryReservationMaterializer::new());
        let policy = Arc::new(InMemoryPolicySource::new(&[]));
        let catalog = InMemoryProductCatalog::new()
            .with_product("farm", 1, 40)
            .with_product("museum", 5, 30);

        let collaborators = Collaborators {
            gateway,
            orders: orders.clone(),
            materializer: reservations.clone(),
            catalog: Arc::new(catalog),
            policy_source: policy.clone(),
        };

        let app = Application::with_collaborators(config, collaborators)
            .await
            .expect("Failed to build test application");
        let http_port = app.http_port();
        let address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        // Wait for HTTP server to be ready by polling health endpoint
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            http_port,
            client,
            gateway: mock,
            orders,
            reservations,
            policy,
        }
    }

    pub async fn create_order(&self, items: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/checkout/orders", self.address))
            .json(&json!({ "items": items }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Creates an order that must succeed and returns the response body.
    pub async fn place_order(&self, items: Value) -> Value {
        let response = self.create_order(items).await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        response.json().await.expect("Failed to parse JSON")
    }

    pub async fn approve(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/payments/approve", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn order_status(&self, order_id: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/checkout/orders/{}", self.address, order_id))
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// A date comfortably inside the default booking window.
pub fn trip_date() -> NaiveDate {
    (Utc::now() + Duration::days(14)).date_naive()
}

pub fn cart_line(product_id: &str, price: u64, participants: u32) -> Value {
    json!({
        "productId": product_id,
        "productName": format!("Program {}", product_id),
        "salePrice": price,
        "participants": participants,
        "reservationDate": trip_date().to_string(),
    })
}
