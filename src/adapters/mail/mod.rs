//! Mail adapters. Implement Mailer.
//!
//! Mailgun over its messages API, and a recording mock.

pub mod mailgun;
pub mod mock_mailer;

pub use mailgun::MailgunMailer;
pub use mock_mailer::MockMailer;
