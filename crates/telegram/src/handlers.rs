use std::{sync::Arc, time::Duration};

use {
    teloxide::{
        payloads::AnswerCallbackQuerySetters,
        prelude::*,
        types::{
            CallbackQuery, ChatMemberUpdated, InlineKeyboardButton, InlineKeyboardMarkup,
            MessageId, User,
        },
    },
    tracing::{debug, info, warn},
};

use votegate_campaigns::{
    ChannelId, Error as CampaignError, Event, EventOutcome, UserId, VoteOutcome, VoteSource,
    VoterRecord, dispatch,
    render::{NOOP_CALLBACK, parse_vote_callback},
};

use crate::{
    config::TelegramBotConfig,
    error::Result,
    links::share_link,
    membership::membership_status,
    outbound::{forward, send_text},
    pending::PendingTake,
    state::BotState,
};

const WELCOME_MSG: &str = "👋 Hi! I run subscribers-only votes in Telegram channels.\n\n\
Add me to your channel as an admin with permission to post, then send /vote. \
Only channel subscribers can vote, and voters who leave the channel are marked on the post.";

const HELP_MSG: &str = "Commands:\n\
/vote @channel - post a subscribers-only vote in a channel\n\
/vote - I will ask which channel to use\n\
/help - show this message";

const CREATE_PROMPT_MSG: &str = "Send me the channel for the vote: its @username, a t.me link or its numeric id.\n\
I must be an admin there with permission to post messages.";

const TIMEOUT_MSG: &str = "Timed out. Send /vote to try again.";

const CREATED_MSG: &str = "✅ The vote is posted. Share this link so subscribers can vote:";

const NOT_ACCESSIBLE_MSG: &str = "❌ I can't post in that channel. Add me as an admin with \
permission to post messages, then send /vote again.";

const CREATE_FAILED_MSG: &str = "Something went wrong while creating the vote. Please try again later.";

const LEFT_ACK_MSG: &str = "You left the channel, so your vote is now marked as left.";

const BROADCAST_OWNER_ONLY_MSG: &str = "Only the owner can use /broadcast.";

const BROADCAST_USAGE_MSG: &str =
    "Usage: /broadcast <text>, or reply to a message with /broadcast to forward it";

const BROADCAST_SUCCESS_PAUSE: Duration = Duration::from_millis(200);
const BROADCAST_FAILURE_PAUSE: Duration = Duration::from_millis(400);

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Start(Option<&'a str>),
    Vote(Option<&'a str>),
    Help,
    Broadcast(&'a str),
    Other(&'a str),
}

/// Handle a message update. Only private chats are served.
pub async fn handle_message(msg: Message, state: &Arc<BotState>) -> Result<()> {
    if !msg.chat.is_private() {
        debug!(chat_id = msg.chat.id.0, "ignoring non-private message");
        return Ok(());
    }
    let (Some(from), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        debug!(chat_id = msg.chat.id.0, "ignoring message without sender or text");
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let sender = user_id(from);

    match parse_command(text, &state.bot_username) {
        Some(Command::Start(Some(payload))) => {
            let outcome = vote(state, payload, voter_record(from), VoteSource::DeepLink).await;
            reply(state, chat_id, vote_ack_text(outcome)).await;
        },
        Some(Command::Start(None)) => {
            let markup = welcome_keyboard(&state.config);
            if let Err(e) = send_text(&state.bot, chat_id, WELCOME_MSG, markup).await {
                warn!(chat_id = chat_id.0, error = %e, "failed to send welcome");
            }
        },
        Some(Command::Help) => reply(state, chat_id, HELP_MSG).await,
        Some(Command::Vote(Some(channel_ref))) => {
            // An explicit argument supersedes any open window.
            let _ = state.pending().take(sender.0);
            create_campaign(state, chat_id, sender, channel_ref).await;
        },
        Some(Command::Vote(None)) => {
            open_creation_window(state, chat_id, sender);
            reply(state, chat_id, CREATE_PROMPT_MSG).await;
        },
        Some(Command::Broadcast(body)) => {
            let payload = if !body.is_empty() {
                Some(BroadcastPayload::Text(body))
            } else {
                msg.reply_to_message()
                    .map(|original| BroadcastPayload::Forward(original.id))
            };
            broadcast(state, chat_id, sender, payload).await;
        },
        Some(Command::Other(name)) => debug!(command = name, "ignoring unknown command"),
        None => {
            let take = state.pending().take(sender.0);
            match take {
                PendingTake::Active => create_campaign(state, chat_id, sender, text.trim()).await,
                PendingTake::Expired => reply(state, chat_id, TIMEOUT_MSG).await,
                PendingTake::None => {
                    debug!(user_id = %sender, "ignoring text without a pending /vote");
                },
            }
        },
    }
    Ok(())
}

/// Handle an inline button press on an anchor message.
pub async fn handle_callback_query(query: CallbackQuery, state: &Arc<BotState>) -> Result<()> {
    let Some(raw) = query.data.as_deref().and_then(parse_vote_callback) else {
        if query.data.as_deref() != Some(NOOP_CALLBACK) {
            debug!(callback_data = ?query.data, "unknown callback payload");
        }
        // Dismiss the loading spinner.
        state.bot.answer_callback_query(&query.id).await?;
        return Ok(());
    };

    let outcome = vote(
        state,
        raw,
        voter_record(&query.from),
        VoteSource::InlineButton,
    )
    .await;
    state
        .bot
        .answer_callback_query(&query.id)
        .text(vote_ack_text(outcome))
        .show_alert(matches!(outcome, Some(VoteOutcome::NotAMember)))
        .await?;
    Ok(())
}

/// Handle a `chat_member` update from a channel the bot administers.
pub async fn handle_chat_member(update: ChatMemberUpdated, state: &Arc<BotState>) -> Result<()> {
    let channel_id = ChannelId(update.chat.id.0);
    let member = user_id(&update.new_chat_member.user);
    let status = membership_status(update.new_chat_member.kind.status());

    let outcome = dispatch(&state.engine, Event::MembershipChanged {
        channel_id,
        user_id: member,
        status,
    })
    .await?;

    if let EventOutcome::MembershipApplied { campaigns_marked } = outcome
        && campaigns_marked > 0
    {
        debug!(
            channel_id = %channel_id,
            user_id = %member,
            campaigns_marked,
            "departure applied"
        );
        // The user may never have opened a private chat with the bot.
        if let Err(e) = send_text(&state.bot, ChatId(member.0), LEFT_ACK_MSG, None).await {
            debug!(user_id = %member, error = %e, "could not notify departed voter");
        }
    }
    Ok(())
}

fn parse_command<'a>(text: &'a str, bot_username: &str) -> Option<Command<'a>> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let name = match head.split_once('@') {
        Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
        Some(_) => return Some(Command::Other(head)),
        None => head,
    };
    let arg = (!args.is_empty()).then_some(args);

    Some(match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start(arg),
        "vote" => Command::Vote(arg),
        "help" => Command::Help,
        "broadcast" => Command::Broadcast(args),
        _ => Command::Other(name),
    })
}

fn user_id(user: &User) -> UserId {
    UserId(user.id.0 as i64)
}

/// Build the voter line shown on the tally: full name, else username, else id.
fn voter_record(user: &User) -> VoterRecord {
    let name = user.full_name();
    let display_name = if !name.trim().is_empty() {
        name.trim().to_string()
    } else if let Some(ref username) = user.username {
        username.clone()
    } else {
        format!("User {}", user.id.0)
    };
    VoterRecord::new(user_id(user), display_name, user.username.clone())
}

fn vote_ack_text(outcome: Option<VoteOutcome>) -> &'static str {
    match outcome {
        Some(VoteOutcome::Recorded) => "✅ Your vote has been counted.",
        Some(VoteOutcome::AlreadyVoted) => "You have already voted.",
        Some(VoteOutcome::NotAMember) => {
            "Only channel subscribers can vote. Join the channel first, then try again."
        },
        Some(VoteOutcome::UnknownCampaign) => "This vote does not exist or has been removed.",
        None => "Something went wrong. Please try again later.",
    }
}

fn welcome_keyboard(config: &TelegramBotConfig) -> Option<InlineKeyboardMarkup> {
    let row = [
        ("Support Group", config.support_group_url.as_deref()),
        ("Support Chat", config.support_chat_url.as_deref()),
    ]
    .into_iter()
    .filter_map(|(label, url)| {
        let url = url?;
        match reqwest::Url::parse(url) {
            Ok(url) => Some(InlineKeyboardButton::url(label, url)),
            Err(e) => {
                warn!(url, error = %e, "ignoring invalid support url");
                None
            },
        }
    })
    .collect::<Vec<_>>();
    (!row.is_empty()).then(|| InlineKeyboardMarkup::new(vec![row]))
}

async fn vote(
    state: &BotState,
    campaign_ref: &str,
    voter: VoterRecord,
    source: VoteSource,
) -> Option<VoteOutcome> {
    let event = Event::VoteRequested {
        campaign_ref: campaign_ref.to_string(),
        voter,
        source,
    };
    match dispatch(&state.engine, event).await {
        Ok(EventOutcome::Vote(outcome)) => Some(outcome),
        Ok(other) => {
            warn!(?other, "unexpected outcome for vote");
            None
        },
        Err(e) => {
            warn!(campaign_ref, error = %e, "vote failed");
            None
        },
    }
}

async fn create_campaign(state: &BotState, chat_id: ChatId, creator: UserId, channel_ref: &str) {
    let event = Event::CampaignCreateRequested {
        channel_ref: channel_ref.to_string(),
        creator_id: creator,
    };
    let text = match dispatch(&state.engine, event).await {
        Ok(EventOutcome::Created(campaign)) => {
            let link = share_link(&state.config.link_host, &state.bot_username, &campaign.id);
            debug!(campaign_id = %campaign.id, "sending share link to creator");
            format!("{CREATED_MSG}\n{link}")
        },
        Ok(other) => {
            warn!(?other, "unexpected outcome for campaign creation");
            CREATE_FAILED_MSG.to_string()
        },
        Err(CampaignError::ChannelNotAccessible { .. }) => {
            debug!(channel_ref, creator_id = %creator, "channel not accessible");
            NOT_ACCESSIBLE_MSG.to_string()
        },
        Err(e) => {
            warn!(channel_ref, error = %e, "campaign creation failed");
            CREATE_FAILED_MSG.to_string()
        },
    };
    reply(state, chat_id, &text).await;
}

/// Open a creation window and arm its expiry timer.
fn open_creation_window(state: &Arc<BotState>, chat_id: ChatId, user: UserId) {
    let (generation, ttl) = {
        let mut pending = state.pending();
        (pending.open(user.0), pending.ttl())
    };

    let state = Arc::clone(state);
    tokio::spawn(async move {
        tokio::select! {
            () = state.cancel.cancelled() => {},
            () = tokio::time::sleep(ttl) => {
                let expired = state.pending().expire(user.0, generation);
                if expired {
                    debug!(user_id = %user, "creation window timed out");
                    reply(&state, chat_id, TIMEOUT_MSG).await;
                }
            },
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BroadcastPayload<'a> {
    Text(&'a str),
    /// Forward the owner's message with this id from the owner's chat.
    Forward(MessageId),
}

async fn broadcast(
    state: &BotState,
    chat_id: ChatId,
    sender: UserId,
    payload: Option<BroadcastPayload<'_>>,
) {
    if !state.config.is_owner(sender.0) {
        debug!(user_id = %sender, "rejecting /broadcast from non-owner");
        reply(state, chat_id, BROADCAST_OWNER_ONLY_MSG).await;
        return;
    }
    let Some(payload) = payload else {
        reply(state, chat_id, BROADCAST_USAGE_MSG).await;
        return;
    };

    let creators = match state.engine.creators().await {
        Ok(creators) => creators,
        Err(e) => {
            warn!(error = %e, "failed to load broadcast recipients");
            reply(state, chat_id, CREATE_FAILED_MSG).await;
            return;
        },
    };

    let notice = format!(
        "Broadcasting to {} chats... (this may take a while)",
        creators.len()
    );
    reply(state, chat_id, &notice).await;

    let report = broadcast_to(&state.bot, chat_id, &creators, payload).await;
    info!(sent = report.sent, failed = report.failed, "broadcast finished");
    let summary = format!(
        "Broadcast finished. Sent: {}. Failed: {}.",
        report.sent, report.failed
    );
    reply(state, chat_id, &summary).await;
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BroadcastReport {
    sent: usize,
    failed: usize,
}

async fn broadcast_to(
    bot: &Bot,
    from_chat: ChatId,
    recipients: &[UserId],
    payload: BroadcastPayload<'_>,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for recipient in recipients {
        let to = ChatId(recipient.0);
        let result = match payload {
            BroadcastPayload::Text(text) => send_text(bot, to, text, None).await.map(|_| ()),
            BroadcastPayload::Forward(message_id) => {
                forward(bot, to, from_chat, message_id).await.map(|_| ())
            },
        };
        match result {
            Ok(()) => {
                report.sent += 1;
                tokio::time::sleep(BROADCAST_SUCCESS_PAUSE).await;
            },
            Err(e) => {
                debug!(user_id = %recipient, error = %e, "broadcast delivery failed");
                report.failed += 1;
                tokio::time::sleep(BROADCAST_FAILURE_PAUSE).await;
            },
        }
    }
    report
}

async fn reply(state: &BotState, chat_id: ChatId, text: &str) {
    if let Err(e) = send_text(&state.bot, chat_id, text, None).await {
        warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}
