use thiserror::Error;

use crate::types::CampaignId;

#[derive(Debug, Error)]
pub enum Error {
    /// The bot cannot post in the requested channel, or the channel does not
    /// resolve at all.
    #[error("channel not accessible: {channel_ref}")]
    ChannelNotAccessible { channel_ref: String },

    #[error("unknown campaign: {campaign_id}")]
    UnknownCampaign { campaign_id: CampaignId },

    /// Only surfaced by the oracle itself; the engine folds it into
    /// `VoteOutcome::NotAMember`.
    #[error("membership query failed: {message}")]
    MembershipQueryFailed { message: String },

    /// Only surfaced by the publisher; the engine logs and swallows it.
    #[error("failed to edit anchor message: {message}")]
    RenderEditFailed { message: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn channel_not_accessible(channel_ref: impl Into<String>) -> Self {
        Self::ChannelNotAccessible {
            channel_ref: channel_ref.into(),
        }
    }

    #[must_use]
    pub fn membership_query_failed(message: impl std::fmt::Display) -> Self {
        Self::MembershipQueryFailed {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn render_edit_failed(message: impl std::fmt::Display) -> Self {
        Self::RenderEditFailed {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
