//! Telegram-backed membership lookups and the channel admin check.

use {
    async_trait::async_trait,
    teloxide::{
        prelude::*,
        types::{ChatMemberStatus, Recipient},
    },
    tracing::debug,
};

use votegate_campaigns::{
    ChannelId, Error as CampaignError, MembershipStatus, Result as CampaignResult, UserId,
    oracle::MembershipOracle, publisher::ChannelAdmin,
};

/// Answers membership questions with `getChatMember`.
///
/// Needs the bot's own user id to check its posting rights.
#[derive(Clone)]
pub struct TelegramMembership {
    bot: Bot,
    bot_user_id: teloxide::types::UserId,
}

impl TelegramMembership {
    pub fn new(bot: Bot, bot_user_id: teloxide::types::UserId) -> Self {
        Self { bot, bot_user_id }
    }
}

#[async_trait]
impl MembershipOracle for TelegramMembership {
    async fn membership(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> CampaignResult<MembershipStatus> {
        let Some(tg_user) = to_telegram_user(user_id) else {
            return Ok(MembershipStatus::Unknown);
        };
        let member = self
            .bot
            .get_chat_member(ChatId(channel_id.0), tg_user)
            .await
            .map_err(CampaignError::membership_query_failed)?;
        let status = membership_status(member.kind.status());
        debug!(channel_id = %channel_id, user_id = %user_id, %status, "membership lookup");
        Ok(status)
    }
}

#[async_trait]
impl ChannelAdmin for TelegramMembership {
    async fn resolve(&self, channel_ref: &str) -> CampaignResult<ChannelId> {
        let recipient = parse_channel_ref(channel_ref)
            .ok_or_else(|| CampaignError::channel_not_accessible(channel_ref))?;
        let chat = self
            .bot
            .get_chat(recipient)
            .await
            .map_err(|e| CampaignError::external("failed to resolve channel", e))?;
        Ok(ChannelId(chat.id.0))
    }

    async fn can_post(&self, channel_id: ChannelId) -> CampaignResult<bool> {
        let member = self
            .bot
            .get_chat_member(ChatId(channel_id.0), self.bot_user_id)
            .await
            .map_err(|e| CampaignError::external("failed to read bot rights", e))?;
        Ok(member.kind.can_post_messages())
    }
}

pub fn membership_status(status: ChatMemberStatus) -> MembershipStatus {
    match status {
        ChatMemberStatus::Owner => MembershipStatus::Owner,
        ChatMemberStatus::Administrator => MembershipStatus::Administrator,
        ChatMemberStatus::Member => MembershipStatus::Member,
        ChatMemberStatus::Restricted => MembershipStatus::Restricted,
        ChatMemberStatus::Left => MembershipStatus::Left,
        ChatMemberStatus::Banned => MembershipStatus::Kicked,
    }
}

/// Telegram user ids are positive; anything else cannot be looked up.
pub(crate) fn to_telegram_user(user_id: UserId) -> Option<teloxide::types::UserId> {
    u64::try_from(user_id.0).ok().map(teloxide::types::UserId)
}

/// Parse `@name`, `name`, `t.me/name`, `https://t.me/name` or a numeric chat
/// id such as `-1001234567890`.
pub fn parse_channel_ref(raw: &str) -> Option<Recipient> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(id) = raw.parse::<i64>() {
        return Some(Recipient::Id(ChatId(id)));
    }

    let name = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw);
    let name = ["t.me/", "telegram.me/"]
        .iter()
        .find_map(|host| name.strip_prefix(host))
        .unwrap_or(name);
    let name = name.trim_start_matches('@').trim_end_matches('/');

    is_valid_username(name).then(|| Recipient::ChannelUsername(format!("@{name}")))
}

fn is_valid_username(name: &str) -> bool {
    (5..=32).contains(&name.len())
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
