//! Share links that open a private chat with the bot and vote.

use votegate_campaigns::CampaignId;

/// `https://<host>/<bot>?start=<campaign id>`.
pub fn share_link(host: &str, bot_username: &str, id: &CampaignId) -> String {
    let host = host.trim_end_matches('/');
    let bot = bot_username.trim_start_matches('@');
    format!("https://{host}/{bot}?start={id}")
}
