//! Twilio adapter. Implements SmsGateway via the Messages REST endpoint.

use crate::domain::DomainError;
use crate::ports::SmsGateway;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

const TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01";

/// Sends SMS through a Twilio account.
///
/// Requires the account SID, auth token and a Twilio-owned sending number.
pub struct TwilioGateway {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

#[derive(Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

impl TwilioGateway {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self::with_base_url(TWILIO_API_URL.to_string(), account_sid, auth_token, from_number)
    }

    /// Point at another API root (a regional edge, or a local stub in tests).
    pub fn with_base_url(
        base_url: String,
        account_sid: String,
        auth_token: String,
        from_number: String,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            from_number,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.base_url, self.account_sid)
    }
}

#[async_trait::async_trait]
impl SmsGateway for TwilioGateway {
    fn from_number(&self) -> Option<String> {
        Some(self.from_number.clone())
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<Option<String>, DomainError> {
        let res = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| DomainError::Sms(format!("Request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|_| "unknown".to_string());
            warn!(status = %status, to, "Twilio rejected message");
            return Err(DomainError::Sms(format!(
                "Twilio API error {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let resource: MessageResource = res
            .json()
            .await
            .map_err(|e| DomainError::Sms(format!("Failed to parse Twilio response: {}", e)))?;
        debug!(to, sid = ?resource.sid, "SMS sent");
        Ok(resource.sid)
    }
}
