use std::sync::{Arc, Mutex, MutexGuard};

use {tokio_util::sync::CancellationToken, votegate_campaigns::CampaignEngine};

use crate::{config::TelegramBotConfig, pending::PendingCreations};

/// Runtime state shared by the polling loop and the update handlers.
pub struct BotState {
    pub bot: teloxide::Bot,
    pub bot_username: String,
    pub config: TelegramBotConfig,
    pub engine: Arc<CampaignEngine>,
    pub cancel: CancellationToken,
    /// Creation windows opened by a bare `/vote` (std::sync::Mutex because
    /// the lookups are synchronous and never held across `.await` points).
    pub pending: Mutex<PendingCreations>,
}

impl BotState {
    pub fn new(
        bot: teloxide::Bot,
        bot_username: impl Into<String>,
        config: TelegramBotConfig,
        engine: Arc<CampaignEngine>,
    ) -> Self {
        let pending = Mutex::new(PendingCreations::new(config.create_timeout_secs));
        Self {
            bot,
            bot_username: bot_username.into(),
            config,
            engine,
            cancel: CancellationToken::new(),
            pending,
        }
    }

    pub(crate) fn pending(&self) -> MutexGuard<'_, PendingCreations> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
