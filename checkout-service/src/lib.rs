pub mod cart;
pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use error::CheckoutError;
pub use startup::{AppState, Application, Collaborators};
