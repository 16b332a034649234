//! service-core: Shared infrastructure for the checkout services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use mongodb;
pub use serde_json;
pub use tracing;
pub use validator;
