//! Channel-side collaborators: the admin check used at creation and the
//! publisher that posts and edits the anchor message.

use async_trait::async_trait;

use crate::{Result, render::RenderInstruction, types::ChannelId};

#[async_trait]
pub trait ChannelAdmin: Send + Sync {
    /// Resolve a user-supplied reference such as `@name`, `-100123` or a
    /// `t.me/name` link.
    async fn resolve(&self, channel_ref: &str) -> Result<ChannelId>;

    /// Whether the bot holds posting rights in the channel.
    async fn can_post(&self, channel_id: ChannelId) -> Result<bool>;
}

#[async_trait]
pub trait AnchorPublisher: Send + Sync {
    /// Post a new tally message and return its message id.
    async fn post(&self, channel_id: ChannelId, render: &RenderInstruction) -> Result<i32>;

    /// Edit an existing tally message in place.
    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: i32,
        render: &RenderInstruction,
    ) -> Result<()>;
}
