use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::providers::{Provider, ProviderError};

pub struct EmailProvider {
    config: SmtpConfig,
}

impl EmailProvider {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ProviderError> {
        let host = self.config.host.as_deref().unwrap_or_default();
        let creds = Credentials::new(
            self.config.user.clone().unwrap_or_default(),
            self.config.password.clone().unwrap_or_default(),
        );

        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| ProviderError(format!("invalid smtp host {host}: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        Ok(builder.port(self.config.port).credentials(creds).build())
    }
}

#[async_trait]
impl Provider for EmailProvider {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), ProviderError> {
        if !self.config.is_configured() {
            tracing::info!(recipient, provider = "email", "[MOCK] email sent");
            return Ok(());
        }

        let from = self.config.from.clone().unwrap_or_default();
        let email = Message::builder()
            .from(from.parse().map_err(|e| ProviderError(format!("invalid from address: {e}")))?)
            .to(recipient
                .parse()
                .map_err(|e| ProviderError(format!("invalid recipient address: {e}")))?)
            .subject("Notification")
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .map_err(|e| ProviderError(format!("failed to build email: {e}")))?;

        let transport = self.build_transport()?;
        transport
            .send(email)
            .await
            .map_err(|e| ProviderError(format!("smtp error: {e}")))?;

        tracing::info!(recipient, provider = "email", "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_smtp_reports_mock_success() {
        let provider = EmailProvider::new(SmtpConfig {
            host: None,
            port: 587,
            user: None,
            password: None,
            from: None,
            use_tls: true,
        });
        assert!(provider.send("a@b.c", "hi").await.is_ok());
    }
}
