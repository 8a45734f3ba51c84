//! Channel-gated voting campaigns.
//!
//! A campaign is a single tally post inside a channel. Only current members of
//! that channel may vote, and voters who later leave are marked on the post.
//! The [`engine::CampaignEngine`] owns the state machine; storage, membership
//! lookups and message edits are injected through the traits in [`store`],
//! [`oracle`] and [`publisher`].

pub mod engine;
pub mod error;
pub mod event;
pub mod oracle;
pub mod publisher;
pub mod render;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use {
    engine::CampaignEngine,
    error::{Error, Result},
    event::{Event, EventOutcome, VoteSource, dispatch},
    types::{Campaign, CampaignId, ChannelId, MembershipStatus, UserId, VoteOutcome, VoterRecord},
};

/// Run database migrations for the campaign tables.
///
/// Call at startup before constructing [`store_sqlite::SqliteCampaignStore`]
/// on a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
