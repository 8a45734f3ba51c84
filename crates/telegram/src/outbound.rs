use {
    async_trait::async_trait,
    std::{future::Future, time::Duration},
    teloxide::{
        ApiError, RequestError,
        payloads::{EditMessageTextSetters, SendMessageSetters},
        prelude::*,
        types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId},
    },
    tracing::{debug, warn},
};

use votegate_campaigns::{
    ChannelId, Error as CampaignError, Result as CampaignResult, publisher::AnchorPublisher,
    render::RenderInstruction,
};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Posts and edits anchor messages in channels.
#[derive(Clone)]
pub struct TelegramPublisher {
    bot: Bot,
}

impl TelegramPublisher {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl AnchorPublisher for TelegramPublisher {
    async fn post(&self, channel_id: ChannelId, render: &RenderInstruction) -> CampaignResult<i32> {
        let chat_id = ChatId(channel_id.0);
        let markup = anchor_keyboard(render);
        let message = run_telegram_request_with_retry(chat_id, "post_anchor", || {
            self.bot
                .send_message(chat_id, render.text.clone())
                .reply_markup(markup.clone())
                .send()
        })
        .await
        .map_err(|e| CampaignError::external("failed to post tally message", e))?;

        debug!(
            channel_id = %channel_id,
            message_id = message.id.0,
            "anchor message posted"
        );
        Ok(message.id.0)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: i32,
        render: &RenderInstruction,
    ) -> CampaignResult<()> {
        let chat_id = ChatId(channel_id.0);
        let markup = anchor_keyboard(render);
        let result = run_telegram_request_with_retry(chat_id, "edit_anchor", || {
            self.bot
                .edit_message_text(chat_id, MessageId(message_id), render.text.clone())
                .reply_markup(markup.clone())
                .send()
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => {
                debug!(channel_id = %channel_id, message_id, "anchor already up to date");
                Ok(())
            },
            Err(e) => Err(CampaignError::render_edit_failed(e)),
        }
    }
}

/// One row: the vote button and the left counter.
pub fn anchor_keyboard(render: &RenderInstruction) -> InlineKeyboardMarkup {
    let row = render
        .buttons()
        .into_iter()
        .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(vec![row])
}

/// Send a plain text message, retrying on flood control.
pub async fn send_text(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<Message, RequestError> {
    run_telegram_request_with_retry(chat_id, "send_text", || {
        let request = bot.send_message(chat_id, text);
        match markup.clone() {
            Some(markup) => request.reply_markup(markup).send(),
            None => request.send(),
        }
    })
    .await
}

/// Forward `message_id` from `from_chat` to `chat_id`.
pub async fn forward(
    bot: &Bot,
    chat_id: ChatId,
    from_chat: ChatId,
    message_id: MessageId,
) -> Result<Message, RequestError> {
    run_telegram_request_with_retry(chat_id, "forward", || {
        bot.forward_message(chat_id, from_chat, message_id).send()
    })
    .await
}

pub(crate) async fn run_telegram_request_with_retry<T, F, Fut>(
    chat_id: ChatId,
    operation: &'static str,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}
