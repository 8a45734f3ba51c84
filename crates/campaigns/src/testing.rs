//! In-memory collaborators for engine and router tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicI32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    Error, Result,
    oracle::MembershipOracle,
    publisher::{AnchorPublisher, ChannelAdmin},
    render::RenderInstruction,
    types::{ChannelId, MembershipStatus, UserId},
};

#[derive(Default)]
pub struct FakeOracle {
    statuses: Mutex<HashMap<(ChannelId, UserId), MembershipStatus>>,
    scripted: Mutex<HashMap<(ChannelId, UserId), VecDeque<MembershipStatus>>>,
    fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl FakeOracle {
    pub fn set(&self, channel_id: ChannelId, user_id: UserId, status: MembershipStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((channel_id, user_id), status);
    }

    /// Answers returned one per query, ahead of the status set with [`Self::set`].
    pub fn script(&self, channel_id: ChannelId, user_id: UserId, answers: &[MembershipStatus]) {
        self.scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((channel_id, user_id), answers.iter().copied().collect());
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }
}

#[async_trait]
impl MembershipOracle for FakeOracle {
    async fn membership(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::membership_query_failed("oracle unavailable"));
        }
        let next = self
            .scripted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&(channel_id, user_id))
            .and_then(VecDeque::pop_front);
        if let Some(status) = next {
            return Ok(status);
        }
        Ok(self
            .statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(channel_id, user_id))
            .copied()
            .unwrap_or(MembershipStatus::Left))
    }
}

pub struct FakeAdmin {
    channel_ref: String,
    channel_id: ChannelId,
    can_post: bool,
}

impl FakeAdmin {
    pub fn with_channel(channel_ref: &str, channel_id: ChannelId) -> Self {
        Self {
            channel_ref: channel_ref.to_string(),
            channel_id,
            can_post: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.can_post = false;
        self
    }
}

#[async_trait]
impl ChannelAdmin for FakeAdmin {
    async fn resolve(&self, channel_ref: &str) -> Result<ChannelId> {
        if channel_ref == self.channel_ref {
            Ok(self.channel_id)
        } else {
            Err(Error::message(format!("chat not found: {channel_ref}")))
        }
    }

    async fn can_post(&self, channel_id: ChannelId) -> Result<bool> {
        Ok(channel_id == self.channel_id && self.can_post)
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    next_id: AtomicI32,
    posts: Mutex<Vec<(ChannelId, RenderInstruction, i32)>>,
    edits: Mutex<Vec<(ChannelId, i32, RenderInstruction)>>,
    fail_edits: AtomicBool,
}

impl RecordingPublisher {
    pub fn posts(&self) -> Vec<(ChannelId, RenderInstruction, i32)> {
        self.posts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn edits(&self) -> Vec<(ChannelId, i32, RenderInstruction)> {
        self.edits.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_edit_text(&self) -> Option<String> {
        self.edits().last().map(|(_, _, r)| r.text.clone())
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnchorPublisher for RecordingPublisher {
    async fn post(&self, channel_id: ChannelId, render: &RenderInstruction) -> Result<i32> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
        self.posts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel_id, render.clone(), id));
        Ok(id)
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: i32,
        render: &RenderInstruction,
    ) -> Result<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(Error::render_edit_failed("message to edit not found"));
        }
        self.edits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel_id, message_id, render.clone()));
        Ok(())
    }
}
