//! In-memory store for tests. No persistence.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    store::{CampaignStore, Mutation},
    types::{Campaign, CampaignId, ChannelId, UserId, VoterRecord},
};

/// `HashMap`-backed store. Each operation holds the lock for its whole
/// check-and-write, which makes every mutation atomic per campaign.
#[derive(Default)]
pub struct InMemoryCampaignStore {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate(
        &self,
        id: &CampaignId,
        f: impl FnOnce(&mut Campaign) -> bool,
    ) -> Option<Mutation> {
        let mut campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let campaign = campaigns.get_mut(id)?;
        let applied = f(campaign);
        Some(Mutation {
            applied,
            campaign: campaign.clone(),
        })
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn insert(&self, campaign: &Campaign) -> Result<bool> {
        let mut campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        if campaigns.contains_key(&campaign.id) {
            return Ok(false);
        }
        campaigns.insert(campaign.id.clone(), campaign.clone());
        Ok(true)
    }

    async fn get(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        let campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        Ok(campaigns.get(id).cloned())
    }

    async fn set_anchor(&self, id: &CampaignId, message_id: i32) -> Result<Option<Mutation>> {
        Ok(self.mutate(id, |c| {
            if c.anchor_message_id.is_some() {
                return false;
            }
            c.anchor_message_id = Some(message_id);
            true
        }))
    }

    async fn add_voter(&self, id: &CampaignId, voter: &VoterRecord) -> Result<Option<Mutation>> {
        Ok(self.mutate(id, |c| {
            if c.has_voted(voter.user_id) {
                return false;
            }
            c.voters.push(voter.clone());
            true
        }))
    }

    async fn mark_left(&self, id: &CampaignId, user_id: UserId) -> Result<Option<Mutation>> {
        Ok(self.mutate(id, |c| c.has_voted(user_id) && c.left.insert(user_id)))
    }

    async fn find_by_voter(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<Vec<CampaignId>> {
        let campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<CampaignId> = campaigns
            .values()
            .filter(|c| c.channel_id == channel_id && c.has_voted(user_id))
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn creators(&self) -> Result<Vec<UserId>> {
        let campaigns = self.campaigns.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<UserId> = campaigns.values().map(|c| c.creator_id).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
