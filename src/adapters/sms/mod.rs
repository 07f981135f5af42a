//! SMS adapters. Implement SmsGateway.
//!
//! Twilio over its REST API, and a recording mock for tests and unconfigured runs.

pub mod mock_sms;
pub mod twilio;

pub use mock_sms::{MockSmsGateway, SentSms};
pub use twilio::TwilioGateway;
