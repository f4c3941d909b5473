//! Resend transactional email API

use async_trait::async_trait;
use serde::Deserialize;

use super::{Email, MailError, Mailer, SentEmail};
use crate::config::MailConfig;
use crate::http::{HttpClient, Method, Request};

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Clone)]
pub struct ResendMailer {
    client: HttpClient,
    api_url: String,
    api_key: String,
}

impl ResendMailer {
    /// None when no API key is configured
    pub fn from_config(config: &MailConfig) -> Option<Self> {
        if config.api_key.trim().is_empty() {
            return None;
        }
        Some(Self {
            // Email calls carry no ceiling of their own
            client: HttpClient::new(None),
            api_url: config.api_url.clone(),
            api_key: config.api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &Email) -> Result<SentEmail, MailError> {
        let request = Request::new(Method::Post, self.api_url.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(serde_json::to_value(email)?);

        let response = self.client.send(request).await?;
        if !response.is_success() {
            return Err(MailError::Rejected {
                status: response.status,
                body: response.body,
            });
        }

        let parsed: SendResponse = serde_json::from_str(&response.body)
            .unwrap_or(SendResponse { id: None });
        Ok(SentEmail { id: parsed.id })
    }
}
