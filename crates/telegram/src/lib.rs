use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{info, warn};

use common::Notifier;

/// Sends operator alerts to every configured Telegram chat.
pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_ids: &[i64]) -> Self {
        Self {
            bot: Bot::new(token),
            chat_ids: chat_ids.iter().copied().map(ChatId).collect(),
        }
    }

    pub fn chat_ids(&self) -> &[ChatId] {
        &self.chat_ids
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        for &chat_id in &self.chat_ids {
            if let Err(e) = self.bot.send_message(chat_id, message).await {
                warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram alert");
            }
        }
    }
}

/// Fallback sink when no Telegram credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) {
        info!(target: "alerts", "{message}");
    }
}
