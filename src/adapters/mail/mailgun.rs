//! Mailgun adapter. Implements Mailer by posting multipart messages.

use crate::domain::DomainError;
use crate::ports::{Email, Mailer};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tracing::{info, warn};

const MAILGUN_API_URL: &str = "https://api.mailgun.net/v3";

/// Delivers mail through a Mailgun sending domain.
pub struct MailgunMailer {
    client: Client,
    base_url: String,
    domain: String,
    api_key: String,
}

impl MailgunMailer {
    pub fn new(domain: String, api_key: String) -> Self {
        Self::with_base_url(MAILGUN_API_URL.to_string(), domain, api_key)
    }

    /// EU accounts use `https://api.eu.mailgun.net/v3`.
    pub fn with_base_url(base_url: String, domain: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            domain,
            api_key,
        }
    }

    fn form(email: &Email) -> Result<Form, DomainError> {
        let mut form = Form::new()
            .text("from", email.from.clone())
            .text("to", email.to.clone())
            .text("subject", email.subject.clone())
            .text("text", email.text_body.clone());
        if let Some(html) = &email.html_body {
            form = form.text("html", html.clone());
        }
        for tag in &email.tags {
            form = form.text("o:tag", tag.clone());
        }
        for attachment in &email.attachments {
            let part = Part::bytes(attachment.data.clone())
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.content_type)
                .map_err(|e| {
                    DomainError::Mail(format!(
                        "Bad content type {} for {}: {}",
                        attachment.content_type, attachment.filename, e
                    ))
                })?;
            form = form.part("attachment", part);
        }
        Ok(form)
    }
}

#[async_trait::async_trait]
impl Mailer for MailgunMailer {
    async fn deliver(&self, email: &Email) -> Result<(), DomainError> {
        let url = format!("{}/{}/messages", self.base_url, self.domain);
        let res = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .multipart(Self::form(email)?)
            .send()
            .await
            .map_err(|e| DomainError::Mail(format!("Request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_else(|_| "unknown".to_string());
            warn!(status = %status, to = %email.to, "Mailgun rejected message");
            return Err(DomainError::Mail(format!(
                "Mailgun API error {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "mail delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Attachment;
    use axum::Router;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use axum::routing::post;

    #[tokio::test]
    async fn test_posts_multipart_with_tags_and_attachment() {
        let router = Router::new().route(
            "/mg.example.org/messages",
            post(|headers: HeaderMap, body: Bytes| async move {
                let content_type = headers["content-type"].to_str().unwrap().to_string();
                assert!(content_type.starts_with("multipart/form-data"));
                let body = String::from_utf8_lossy(&body).to_string();
                assert!(body.contains("name=\"o:tag\""));
                assert!(body.contains("weekly_report"));
                assert!(body.contains("filename=\"incidents.csv\""));
                "{\"message\":\"Queued. Thank you.\"}"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let mailer =
            MailgunMailer::with_base_url(format!("http://{addr}"), "mg.example.org".into(), "key".into());
        let email = Email {
            from: "DAT <incidents@example.org>".into(),
            to: "Dana Lee <dana@example.org>".into(),
            subject: "Report".into(),
            text_body: "body".into(),
            tags: vec!["incidents".into(), "weekly_report".into()],
            attachments: vec![Attachment {
                filename: "incidents.csv".into(),
                content_type: "text/csv".into(),
                data: b"Number\n25-001\n".to_vec(),
            }],
            ..Default::default()
        };
        mailer.deliver(&email).await.unwrap();
    }

    #[test]
    fn test_bad_content_type_is_mail_error() {
        let email = Email {
            attachments: vec![Attachment {
                filename: "map".into(),
                content_type: "not a mime".into(),
                data: vec![],
            }],
            ..Default::default()
        };
        assert!(matches!(MailgunMailer::form(&email), Err(DomainError::Mail(_))));
    }
}
