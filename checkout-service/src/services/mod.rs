pub mod approval;
pub mod catalog;
pub mod checkout;
pub mod gateway;
pub mod materializer;
pub mod metrics;
pub mod policy;
pub mod repository;
pub mod settlement;

pub use crate::error::CheckoutError;
pub use approval::PaymentApprovalService;
pub use catalog::{InMemoryProductCatalog, MongoProductCatalog, ProductCatalog};
pub use checkout::CheckoutSessionBuilder;
pub use gateway::{HttpPaymentGateway, MockPaymentGateway, PaymentGateway};
pub use materializer::{
    InMemoryReservationMaterializer, MaterializeOutcome, MongoReservationMaterializer,
    ReservationMaterializer,
};
pub use metrics::{get_metrics, init_metrics};
pub use policy::{
    InMemoryPolicySource, MongoPolicySource, PolicySource, ReservationPolicyService,
    ReservationSettings,
};
pub use repository::{CheckoutOrderStore, InMemoryCheckoutOrderStore, MongoCheckoutOrderStore};
pub use settlement::{SettlementOutcome, SettlementService};
