use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, Me, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use votegate_campaigns::CampaignEngine;

use crate::{
    config::TelegramBotConfig,
    error::{Error, Result},
    handlers,
    state::BotState,
};

/// Build a bot whose HTTP client outlives the long-polling timeout (30s), so
/// the client doesn't abort `getUpdates` before Telegram responds.
pub fn build_bot(config: &TelegramBotConfig) -> Result<Bot> {
    if !config.has_token() {
        return Err(Error::message("telegram bot token is not configured"));
    }
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(45))
        .build()?;
    Ok(Bot::with_client(config.token.expose_secret(), client))
}

/// Verify credentials and return the bot's own identity.
pub async fn connect(bot: &Bot) -> Result<Me> {
    let me = bot.get_me().await?;

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    // Register slash commands for autocomplete in Telegram clients.
    let commands = vec![
        BotCommand::new("vote", "Post a subscribers-only vote in a channel"),
        BotCommand::new("help", "Show available commands"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(
        username = ?me.user.username,
        "telegram bot connected (webhook cleared)"
    );
    Ok(me)
}

/// Start polling with an already connected bot.
///
/// Spawns a background task that processes updates until the returned
/// `CancellationToken` is cancelled. Each update is handled on its own task so
/// a slow membership lookup never stalls the loop.
pub fn start_polling(
    bot: Bot,
    me: &Me,
    config: TelegramBotConfig,
    engine: Arc<CampaignEngine>,
) -> CancellationToken {
    let bot_username = me.user.username.clone().unwrap_or_default();
    let state = Arc::new(BotState::new(bot.clone(), bot_username, config, engine));
    let cancel = state.cancel.clone();

    tokio::spawn(async move {
        info!("starting telegram manual polling loop");
        let mut offset: i32 = 0;

        loop {
            let result = tokio::select! {
                () = state.cancel.cancelled() => {
                    info!("telegram polling stopped");
                    break;
                },
                result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(30)
                    .allowed_updates(vec![
                        AllowedUpdate::Message,
                        AllowedUpdate::CallbackQuery,
                        AllowedUpdate::ChatMember,
                    ])
                    .send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            handle_update(update.kind, &state).await;
                        });
                    }
                },
                Err(e) => {
                    // Another bot instance is running with the same token.
                    if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                        warn!(
                            "telegram bot disabled: another instance is already running with this token"
                        );
                        state.cancel.cancel();
                        break;
                    }

                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                },
            }
        }
    });

    cancel
}

async fn handle_update(kind: UpdateKind, state: &Arc<BotState>) {
    match kind {
        UpdateKind::Message(msg) => {
            debug!(chat_id = msg.chat.id.0, "received telegram message");
            if let Err(e) = handlers::handle_message(msg, state).await {
                error!(error = %e, "error handling telegram message");
            }
        },
        UpdateKind::CallbackQuery(query) => {
            debug!(callback_data = ?query.data, "received telegram callback query");
            if let Err(e) = handlers::handle_callback_query(query, state).await {
                error!(error = %e, "error handling telegram callback query");
            }
        },
        UpdateKind::ChatMember(update) => {
            debug!(
                chat_id = update.chat.id.0,
                user_id = update.new_chat_member.user.id.0,
                "received telegram chat member update"
            );
            if let Err(e) = handlers::handle_chat_member(update, state).await {
                error!(error = %e, "error handling telegram chat member update");
            }
        },
        other => {
            debug!("ignoring unsupported update: {other:?}");
        },
    }
}
