//! Inbound events and the thin router that feeds them to the engine.
//!
//! The transport turns platform updates into [`Event`]s; [`dispatch`] maps
//! each variant to exactly one engine entry point.

use tracing::debug;

use crate::{
    Result,
    engine::CampaignEngine,
    types::{Campaign, CampaignId, ChannelId, MembershipStatus, UserId, VoteOutcome, VoterRecord},
};

/// Where a vote came from. Only used for logging; both paths behave the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteSource {
    /// `/start <campaign id>` in a private chat.
    DeepLink,
    /// The vote button on the anchor message.
    InlineButton,
}

#[derive(Debug, Clone)]
pub enum Event {
    CampaignCreateRequested {
        channel_ref: String,
        creator_id: UserId,
    },
    VoteRequested {
        /// Raw payload; validated during dispatch.
        campaign_ref: String,
        voter: VoterRecord,
        source: VoteSource,
    },
    MembershipChanged {
        channel_id: ChannelId,
        user_id: UserId,
        status: MembershipStatus,
    },
}

#[derive(Debug, Clone)]
pub enum EventOutcome {
    Created(Campaign),
    Vote(VoteOutcome),
    MembershipApplied { campaigns_marked: usize },
}

pub async fn dispatch(engine: &CampaignEngine, event: Event) -> Result<EventOutcome> {
    match event {
        Event::CampaignCreateRequested {
            channel_ref,
            creator_id,
        } => engine
            .create_campaign(&channel_ref, creator_id)
            .await
            .map(EventOutcome::Created),
        Event::VoteRequested {
            campaign_ref,
            voter,
            source,
        } => {
            debug!(campaign_ref = %campaign_ref, user_id = %voter.user_id, ?source, "vote requested");
            let Some(campaign_id) = CampaignId::parse(&campaign_ref) else {
                return Ok(EventOutcome::Vote(VoteOutcome::UnknownCampaign));
            };
            engine
                .admit_vote(&campaign_id, &voter)
                .await
                .map(EventOutcome::Vote)
        },
        Event::MembershipChanged {
            channel_id,
            user_id,
            status,
        } => engine
            .report_membership_change(channel_id, user_id, status)
            .await
            .map(|campaigns_marked| EventOutcome::MembershipApplied { campaigns_marked }),
    }
}
