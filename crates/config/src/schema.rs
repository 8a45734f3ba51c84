//! Config schema types.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteGateConfig {
    pub database: DatabaseConfig,
    pub campaigns: CampaignsConfig,
    /// Telegram bot account. Kept as a raw value so the transport owns its
    /// schema.
    pub telegram: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://votegate.db?mode=rwc".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignsConfig {
    /// Upper bound on a single membership lookup; slower answers count as
    /// "not a member".
    pub membership_timeout_secs: u64,
}

impl Default for CampaignsConfig {
    fn default() -> Self {
        Self {
            membership_timeout_secs: 5,
        }
    }
}

impl VoteGateConfig {
    /// Set a string field inside the `telegram` object, creating it if needed.
    pub fn set_telegram_field(&mut self, key: &str, value: serde_json::Value) {
        if !self.telegram.is_object() {
            self.telegram = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.telegram.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }
}
