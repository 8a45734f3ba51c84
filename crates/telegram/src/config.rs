use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Configuration for the voting bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramBotConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// User allowed to run `/broadcast`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,

    /// How long a bare `/vote` waits for the channel reference.
    pub create_timeout_secs: u64,

    /// Host used in share links (`https://<host>/<bot>?start=<id>`).
    pub link_host: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_group_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_chat_url: Option<String>,
}

impl TelegramBotConfig {
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == Some(user_id)
    }

    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

impl std::fmt::Debug for TelegramBotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBotConfig")
            .field("token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("create_timeout_secs", &self.create_timeout_secs)
            .field("link_host", &self.link_host)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramBotConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            owner_id: None,
            create_timeout_secs: 60,
            link_host: "t.me".into(),
            support_group_url: None,
            support_chat_url: None,
        }
    }
}
