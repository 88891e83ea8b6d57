use async_trait::async_trait;
use teloxide::prelude::*;

use crate::config::TelegramConfig;
use crate::providers::{Provider, ProviderError};

pub struct TelegramProvider {
    bot: Option<Bot>,
}

impl TelegramProvider {
    pub fn new(config: TelegramConfig) -> Self {
        let bot = config.bot_token.filter(|t| !t.is_empty()).map(Bot::new);
        Self { bot }
    }
}

#[async_trait]
impl Provider for TelegramProvider {
    fn channel(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, recipient: &str, message: &str) -> Result<(), ProviderError> {
        let Some(bot) = &self.bot else {
            tracing::info!(recipient, provider = "telegram", "[MOCK] telegram message sent");
            return Ok(());
        };

        let chat_id: i64 = recipient
            .parse()
            .map_err(|_| ProviderError(format!("invalid telegram chat id: {recipient}")))?;

        bot.send_message(ChatId(chat_id), message)
            .await
            .map_err(|e| ProviderError(format!("telegram api error: {e}")))?;

        tracing::info!(recipient, provider = "telegram", "telegram message sent");
        Ok(())
    }
}
