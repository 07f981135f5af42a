//! Infrastructure adapters. Implement outbound ports, and serve the inbound HTTP API.
//!
//! SQLite, SMS and mail gateways, link and map services. Map errors to DomainError.

pub mod http;
pub mod integrations;
pub mod mail;
pub mod persistence;
pub mod reporting;
pub mod sms;
