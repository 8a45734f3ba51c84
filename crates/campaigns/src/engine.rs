//! The campaign state machine.
//!
//! Per (campaign, user): `NotVoted -> Voted -> VotedAndLeft`. Votes are only
//! admitted for current channel members, a repeated vote is a no-op, and a
//! departure mark is never cleared. All writes go through the store's
//! conditional operations; the engine itself holds no locks, so oracle calls
//! and message edits never block other campaigns or other voters.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    oracle::MembershipOracle,
    publisher::{AnchorPublisher, ChannelAdmin},
    render::render,
    store::CampaignStore,
    types::{
        Campaign, CampaignId, ChannelId, MembershipStatus, UserId, VoteOutcome, VoterRecord,
        now_secs,
    },
};

/// Default upper bound on a single membership lookup.
pub const DEFAULT_MEMBERSHIP_TIMEOUT: Duration = Duration::from_secs(5);

/// Fresh ids drawn before giving up on an insert.
const MAX_ID_ATTEMPTS: usize = 5;

pub struct CampaignEngine {
    store: Arc<dyn CampaignStore>,
    oracle: Arc<dyn MembershipOracle>,
    admin: Arc<dyn ChannelAdmin>,
    publisher: Arc<dyn AnchorPublisher>,
    membership_timeout: Duration,
}

impl CampaignEngine {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        oracle: Arc<dyn MembershipOracle>,
        admin: Arc<dyn ChannelAdmin>,
        publisher: Arc<dyn AnchorPublisher>,
    ) -> Self {
        Self {
            store,
            oracle,
            admin,
            publisher,
            membership_timeout: DEFAULT_MEMBERSHIP_TIMEOUT,
        }
    }

    pub fn with_membership_timeout(mut self, timeout: Duration) -> Self {
        self.membership_timeout = timeout;
        self
    }

    pub async fn campaign(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        self.store.get(id).await
    }

    /// Distinct users who have created at least one campaign.
    pub async fn creators(&self) -> Result<Vec<UserId>> {
        self.store.creators().await
    }

    /// Create a campaign in the referenced channel and post its empty tally.
    ///
    /// Fails with [`Error::ChannelNotAccessible`] when the channel does not
    /// resolve or the bot cannot post there.
    pub async fn create_campaign(&self, channel_ref: &str, creator_id: UserId) -> Result<Campaign> {
        let channel_id = match self.admin.resolve(channel_ref).await {
            Ok(channel_id) => channel_id,
            Err(e) => {
                warn!(channel_ref, error = %e, "channel did not resolve");
                return Err(Error::channel_not_accessible(channel_ref));
            },
        };

        match self.admin.can_post(channel_id).await {
            Ok(true) => {},
            Ok(false) => {
                info!(channel_ref, channel_id = %channel_id, "bot lacks posting rights");
                return Err(Error::channel_not_accessible(channel_ref));
            },
            Err(e) => {
                warn!(channel_ref, channel_id = %channel_id, error = %e, "admin check failed");
                return Err(Error::channel_not_accessible(channel_ref));
            },
        }

        let mut campaign = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = Campaign::new(CampaignId::generate(), channel_id, creator_id, now_secs());
            if self.store.insert(&candidate).await? {
                campaign = Some(candidate);
                break;
            }
            debug!(campaign_id = %candidate.id, "campaign id collision, retrying");
        }
        let campaign =
            campaign.ok_or_else(|| Error::message("could not allocate a unique campaign id"))?;

        let message_id = self
            .publisher
            .post(campaign.channel_id, &render(&campaign))
            .await?;

        let mutation = self
            .store
            .set_anchor(&campaign.id, message_id)
            .await?
            .ok_or_else(|| Error::UnknownCampaign {
                campaign_id: campaign.id.clone(),
            })?;

        info!(
            campaign_id = %campaign.id,
            channel_id = %campaign.channel_id,
            creator_id = %creator_id,
            message_id,
            "campaign created"
        );
        Ok(mutation.campaign)
    }

    /// Admit a vote from `voter`, if they are a current channel member.
    ///
    /// The vote is durable before this returns `Recorded`. The tally edit
    /// that follows is best effort.
    pub async fn admit_vote(
        &self,
        campaign_id: &CampaignId,
        voter: &VoterRecord,
    ) -> Result<VoteOutcome> {
        let Some(campaign) = self.store.get(campaign_id).await? else {
            debug!(campaign_id = %campaign_id, "vote for unknown campaign");
            return Ok(VoteOutcome::UnknownCampaign);
        };

        if campaign.has_voted(voter.user_id) {
            debug!(campaign_id = %campaign_id, user_id = %voter.user_id, "already voted");
            return Ok(VoteOutcome::AlreadyVoted);
        }

        if !self.is_member(campaign.channel_id, voter.user_id).await {
            debug!(
                campaign_id = %campaign_id,
                user_id = %voter.user_id,
                "vote rejected: not a channel member"
            );
            return Ok(VoteOutcome::NotAMember);
        }

        let Some(mutation) = self.store.add_voter(campaign_id, voter).await? else {
            return Ok(VoteOutcome::UnknownCampaign);
        };
        if !mutation.applied {
            // A concurrent attempt by the same user won the insert.
            return Ok(VoteOutcome::AlreadyVoted);
        }

        info!(
            campaign_id = %campaign_id,
            user_id = %voter.user_id,
            voters = mutation.campaign.voter_count(),
            "vote recorded"
        );

        // A departure handled between the membership check and the insert
        // found no vote to mark, so look again now that the vote is stored.
        let mut campaign = mutation.campaign;
        if let Some(status) = self.lookup(campaign.channel_id, voter.user_id).await
            && status.is_departure()
            && let Some(marked) = self.store.mark_left(campaign_id, voter.user_id).await?
        {
            info!(
                campaign_id = %campaign_id,
                user_id = %voter.user_id,
                %status,
                "voter left while voting"
            );
            campaign = marked.campaign;
        }

        self.rerender(&campaign).await;
        Ok(VoteOutcome::Recorded)
    }

    /// Apply a membership change in `channel_id` to every campaign there that
    /// `user_id` voted in. Returns how many campaigns gained a departure mark.
    ///
    /// Rejoining never clears a mark.
    pub async fn report_membership_change(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
        status: MembershipStatus,
    ) -> Result<usize> {
        if !status.is_departure() {
            debug!(channel_id = %channel_id, user_id = %user_id, %status, "membership change ignored");
            return Ok(0);
        }

        let ids = self.store.find_by_voter(channel_id, user_id).await?;
        let mut marked = 0;
        for id in ids {
            match self.store.mark_left(&id, user_id).await {
                Ok(Some(mutation)) if mutation.applied => {
                    info!(
                        campaign_id = %id,
                        user_id = %user_id,
                        %status,
                        left = mutation.campaign.left_count(),
                        "voter left channel"
                    );
                    marked += 1;
                    self.rerender(&mutation.campaign).await;
                },
                Ok(_) => {},
                Err(e) => {
                    warn!(campaign_id = %id, user_id = %user_id, error = %e, "failed to mark voter as left");
                },
            }
        }
        Ok(marked)
    }

    /// Fail-closed membership check: errors and timeouts count as "no".
    async fn is_member(&self, channel_id: ChannelId, user_id: UserId) -> bool {
        self.lookup(channel_id, user_id)
            .await
            .is_some_and(MembershipStatus::is_member)
    }

    /// Bounded oracle lookup. `None` when the query fails or times out.
    async fn lookup(&self, channel_id: ChannelId, user_id: UserId) -> Option<MembershipStatus> {
        match tokio::time::timeout(
            self.membership_timeout,
            self.oracle.membership(channel_id, user_id),
        )
        .await
        {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                warn!(channel_id = %channel_id, user_id = %user_id, error = %e, "membership query failed");
                None
            },
            Err(_) => {
                warn!(
                    channel_id = %channel_id,
                    user_id = %user_id,
                    timeout_ms = self.membership_timeout.as_millis() as u64,
                    "membership query timed out"
                );
                None
            },
        }
    }

    /// Edit the anchor from a post-mutation copy. Failures are logged only.
    async fn rerender(&self, campaign: &Campaign) {
        let Some(message_id) = campaign.anchor_message_id else {
            debug!(campaign_id = %campaign.id, "no anchor yet, skipping render");
            return;
        };
        if let Err(e) = self
            .publisher
            .edit(campaign.channel_id, message_id, &render(campaign))
            .await
        {
            warn!(
                campaign_id = %campaign.id,
                message_id,
                error = %e,
                "failed to update tally message"
            );
        }
    }
}
