//! Configuration loading and env substitution.
//!
//! Config files: `votegate.toml`, `votegate.yaml`, or `votegate.json`
//! Searched in `./` then the user config directory (`~/.config/votegate/`).
//!
//! Supports `${ENV_VAR}` substitution in all string values, and a fixed set of
//! environment overrides applied after the file is read.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load, load_config},
    schema::{CampaignsConfig, DatabaseConfig, VoteGateConfig},
};
