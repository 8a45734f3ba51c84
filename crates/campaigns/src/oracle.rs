use async_trait::async_trait;

use crate::{
    Result,
    types::{ChannelId, MembershipStatus, UserId},
};

/// Answers "what is user U's status in channel C right now?".
///
/// Implementations report transport failures as
/// [`crate::Error::MembershipQueryFailed`]; the engine treats any error, and
/// any timeout, as "not a member".
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    async fn membership(&self, channel_id: ChannelId, user_id: UserId)
    -> Result<MembershipStatus>;
}
