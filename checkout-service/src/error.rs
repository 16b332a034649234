use service_core::error::AppError;
use thiserror::Error;

use crate::cart::CartStorageError;

/// Failures of the checkout pipeline, before they are mapped to HTTP.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Client input is missing or unacceptable. Never sent to the provider.
    #[error("{0}")]
    Validation(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Checkout order {0} not found")]
    OrderNotFound(String),

    #[error("Payment gateway credentials are not configured")]
    NotConfigured,

    #[error("Cart storage error: {0}")]
    Cart(#[from] CartStorageError),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl CheckoutError {
    pub fn validation(message: impl Into<String>) -> Self {
        CheckoutError::Validation(message.into())
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(msg) => AppError::UnprocessableEntity(anyhow::anyhow!(msg)),
            CheckoutError::MissingParameter(name) => {
                AppError::BadRequest(anyhow::anyhow!("{} is required", name))
            }
            e @ CheckoutError::OrderNotFound(_) => AppError::NotFound(anyhow::anyhow!(e.to_string())),
            CheckoutError::NotConfigured => {
                AppError::ConfigError(anyhow::anyhow!("payment gateway not configured"))
            }
            CheckoutError::Cart(e @ CartStorageError::InvalidEdit(_)) => {
                AppError::UnprocessableEntity(anyhow::anyhow!(e.to_string()))
            }
            CheckoutError::Cart(e) => AppError::InternalError(anyhow::Error::new(e)),
            CheckoutError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}
