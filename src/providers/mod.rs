pub mod email;
pub mod sms;
pub mod telegram;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;

/// A provider-level delivery failure. This never escapes to the HTTP layer; the
/// delivery engine turns it into a failure attempt and moves on to the next channel.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProviderError(pub String);

/// A single delivery channel (email, sms, telegram, ...).
///
/// Implementations decide for themselves whether to attempt real I/O or report
/// mock success: the engine has no notion of "is this provider configured".
#[async_trait]
pub trait Provider: Send + Sync {
    /// The channel tag this provider answers to, e.g. `"email"`.
    fn channel(&self) -> &'static str;

    async fn send(&self, recipient: &str, message: &str) -> Result<(), ProviderError>;
}

/// Build the fixed provider registry from configuration. Each provider is
/// constructed unconditionally; credential completeness is checked per-send,
/// not at registry build time.
pub fn build_registry(config: &Config) -> HashMap<&'static str, Arc<dyn Provider>> {
    let mut registry: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();

    let email_provider = email::EmailProvider::new(config.smtp.clone());
    registry.insert(email_provider.channel(), Arc::new(email_provider));

    let sms_provider = sms::SmsProvider::new(config.twilio.clone());
    registry.insert(sms_provider.channel(), Arc::new(sms_provider));

    let telegram_provider = telegram::TelegramProvider::new(config.telegram.clone());
    registry.insert(telegram_provider.channel(), Arc::new(telegram_provider));

    registry
}
