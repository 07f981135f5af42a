//! Mock SMS gateway. Records messages instead of sending them.

use crate::domain::DomainError;
use crate::ports::SmsGateway;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub const MOCK_FROM_NUMBER: &str = "+15550000000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub to: String,
    pub body: String,
}

/// Recording gateway for tests and runs without Twilio credentials.
#[derive(Default)]
pub struct MockSmsGateway {
    sent: Mutex<Vec<SentSms>>,
    unreachable: AtomicBool,
}

impl MockSmsGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_body(&self) -> Option<String> {
        self.sent().pop().map(|s| s.body)
    }

    /// While set, every send fails as if the gateway were down.
    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait::async_trait]
impl SmsGateway for MockSmsGateway {
    fn from_number(&self) -> Option<String> {
        Some(MOCK_FROM_NUMBER.to_string())
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<Option<String>, DomainError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DomainError::Sms(format!("[MOCK] gateway unreachable, dropped SMS to {to}")));
        }
        info!(to, len = body.len(), "[MOCK] SMS recorded");
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| DomainError::Sms("mock outbox poisoned".into()))?;
        sent.push(SentSms {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(Some(format!("MOCK{}", sent.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_in_order() {
        let gateway = MockSmsGateway::new();
        gateway.send_sms("5105550101", "first").await.unwrap();
        let id = gateway.send_sms("5105550102", "second").await.unwrap();

        assert_eq!(id.as_deref(), Some("MOCK2"));
        assert_eq!(gateway.sent().len(), 2);
        assert_eq!(gateway.last_body().as_deref(), Some("second"));

        gateway.clear();
        assert!(gateway.sent().is_empty());
    }
}
