use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::TwilioConfig;
use crate::providers::{Provider, ProviderError};

pub struct SmsProvider {
    config: TwilioConfig,
    client: Client,
}

impl SmsProvider {
    pub fn new(config: TwilioConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build SMS HTTP client");
        Self { config, client }
    }
}

#[async_trait]
impl Provider for SmsProvider {
    fn channel(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), ProviderError> {
        if !self.config.is_configured() {
            tracing::info!(recipient, provider = "sms", "[MOCK] sms sent");
            return Ok(());
        }

        let account_sid = self.config.account_sid.as_deref().unwrap_or_default();
        let auth_token = self.config.auth_token.as_deref().unwrap_or_default();
        let from_number = self.config.from_number.as_deref().unwrap_or_default();

        let url = format!("https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json");

        let response = self
            .client
            .post(&url)
            .basic_auth(account_sid, Some(auth_token))
            .form(&[("From", from_number), ("To", recipient), ("Body", message)])
            .send()
            .await
            .map_err(|e| ProviderError(format!("twilio request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError(format!("twilio error {status}: {body}")));
        }

        tracing::info!(recipient, provider = "sms", "sms sent");
        Ok(())
    }
}
