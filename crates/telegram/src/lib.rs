//! Telegram transport for channel-gated voting.
//!
//! Polls the Bot API with teloxide, turns updates into campaign events and
//! renders tallies as channel messages with an inline keyboard. Also provides
//! the Telegram-backed membership oracle, admin check and anchor publisher.

pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod links;
pub mod membership;
pub mod outbound;
pub mod pending;
pub mod state;

pub use {
    bot::{build_bot, connect, start_polling},
    config::TelegramBotConfig,
    error::{Error, Result},
    membership::TelegramMembership,
    outbound::TelegramPublisher,
};
