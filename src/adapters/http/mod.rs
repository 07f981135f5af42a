//! Inbound HTTP adapter (axum): JSON API for dispatchers and the SMS gateway webhook.

pub mod dto;
pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{ACTOR_HEADER, AppState, Gateways, router};
