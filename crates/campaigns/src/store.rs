//! Persistence trait for campaign records.
//!
//! Every mutation is a conditional, campaign-scoped write that hands back the
//! record as it stands right after the write. Callers render from that copy
//! instead of re-reading, so a concurrent sibling write is never discarded.

use async_trait::async_trait;

use crate::{
    Result,
    types::{Campaign, CampaignId, ChannelId, UserId, VoterRecord},
};

/// Outcome of a conditional write on an existing campaign.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// `false` when the condition did not hold and nothing was written.
    pub applied: bool,
    /// The campaign after the write (or unchanged, if not applied).
    pub campaign: Campaign,
}

/// Durable campaign storage. Mutations return `Ok(None)` for unknown ids.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Insert a new campaign. Returns `false` if the id is already taken.
    async fn insert(&self, campaign: &Campaign) -> Result<bool>;

    async fn get(&self, id: &CampaignId) -> Result<Option<Campaign>>;

    /// Record the anchor message, only if none is set yet.
    async fn set_anchor(&self, id: &CampaignId, message_id: i32) -> Result<Option<Mutation>>;

    /// Add a voter, only if that user has not voted yet.
    async fn add_voter(&self, id: &CampaignId, voter: &VoterRecord) -> Result<Option<Mutation>>;

    /// Mark a voter as departed, only if they voted and are not marked yet.
    async fn mark_left(&self, id: &CampaignId, user_id: UserId) -> Result<Option<Mutation>>;

    /// Ids of campaigns anchored in `channel_id` that `user_id` voted in.
    async fn find_by_voter(&self, channel_id: ChannelId, user_id: UserId)
    -> Result<Vec<CampaignId>>;

    /// Distinct campaign creators.
    async fn creators(&self) -> Result<Vec<UserId>>;
}
