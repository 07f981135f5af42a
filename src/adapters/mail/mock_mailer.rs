//! Mock mailer. Keeps delivered mail in memory.

use crate::domain::DomainError;
use crate::ports::{Email, Mailer};
use std::sync::Mutex;
use tracing::info;

#[derive(Default)]
pub struct MockMailer {
    deliveries: Mutex<Vec<Email>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Email> {
        self.deliveries.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Mailer for MockMailer {
    async fn deliver(&self, email: &Email) -> Result<(), DomainError> {
        info!(to = %email.to, subject = %email.subject, "[MOCK] mail recorded");
        self.deliveries
            .lock()
            .map_err(|_| DomainError::Mail("mock mailbox poisoned".into()))?
            .push(email.clone());
        Ok(())
    }
}
