//! Tally rendering. Pure: the same campaign always renders the same way.

use std::fmt::Write;

use crate::types::{Campaign, CampaignId, VoterRecord};

/// Callback payload prefix of the vote button.
pub const VOTE_CALLBACK_PREFIX: &str = "vote:";

/// Callback payload of the non-actionable left-count button.
pub const NOOP_CALLBACK: &str = "noop";

/// Telegram rejects message text longer than this.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// An inline button: a label and the payload sent back when pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub callback_data: String,
}

/// What the transport needs to draw the anchor message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInstruction {
    pub text: String,
    pub vote_button: Button,
    /// Shows the left count; pressing it does nothing.
    pub left_button: Button,
}

impl RenderInstruction {
    /// Buttons in display order, one row.
    pub fn buttons(&self) -> [&Button; 2] {
        [&self.vote_button, &self.left_button]
    }
}

pub fn vote_callback_data(id: &CampaignId) -> String {
    format!("{VOTE_CALLBACK_PREFIX}{id}")
}

/// Extract the raw campaign id from a vote button payload.
pub fn parse_vote_callback(data: &str) -> Option<&str> {
    data.strip_prefix(VOTE_CALLBACK_PREFIX)
}

/// Header line: `Voters: N`, plus `, Left: M` once anyone has left.
pub fn tally_line(voters: usize, left: usize) -> String {
    if left == 0 {
        format!("Voters: {voters}")
    } else {
        format!("Voters: {voters}, Left: {left}")
    }
}

/// Length as Telegram counts it (UTF-16 code units).
fn message_len(text: &str) -> usize {
    text.encode_utf16().count()
}

fn voter_line(campaign: &Campaign, position: usize, voter: &VoterRecord) -> String {
    let mut line = format!("\n{position}. {}", voter.display_name);
    if let Some(ref username) = voter.username {
        let _ = write!(line, " (@{username})");
    }
    if campaign.has_left(voter.user_id) {
        line.push_str(" [left]");
    }
    line
}

fn overflow_line(hidden: usize) -> String {
    format!("\n…and {hidden} more")
}

/// The tally text. The header and counts are always exact; the voter list is
/// cut short with an overflow line when the text would not fit in one
/// message.
fn tally_text(campaign: &Campaign) -> String {
    let mut text = String::from("🗳 Subscribers-only vote\n");
    text.push_str(&tally_line(campaign.voter_count(), campaign.left_count()));
    text.push('\n');

    if campaign.voters.is_empty() {
        text.push_str("\nNo votes yet.");
        return text;
    }

    let total = campaign.voters.len();
    let mut used = message_len(&text);
    for (i, voter) in campaign.voters.iter().enumerate() {
        let line = voter_line(campaign, i + 1, voter);
        let hidden_after = total - i - 1;
        let reserve = if hidden_after == 0 {
            0
        } else {
            message_len(&overflow_line(hidden_after))
        };
        let line_len = message_len(&line);
        if used + line_len + reserve > TELEGRAM_MAX_MESSAGE_LEN {
            // Room for the overflow line was reserved by the previous voter.
            text.push_str(&overflow_line(total - i));
            break;
        }
        used += line_len;
        text.push_str(&line);
    }
    text
}

pub fn render(campaign: &Campaign) -> RenderInstruction {
    let voters = campaign.voter_count();
    let left = campaign.left_count();

    RenderInstruction {
        text: tally_text(campaign),
        vote_button: Button {
            label: format!("✅ Vote ({voters})"),
            callback_data: vote_callback_data(&campaign.id),
        },
        left_button: Button {
            label: format!("🚪 Left: {left}"),
            callback_data: NOOP_CALLBACK.to_string(),
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::{ChannelId, UserId},
        rstest::rstest,
    };

    fn campaign() -> Campaign {
        Campaign::new(
            CampaignId::parse("abcdefghij").unwrap(),
            ChannelId(-100),
            UserId(1),
            0,
        )
    }

    #[rstest]
    #[case(0, 0, "Voters: 0")]
    #[case(1, 0, "Voters: 1")]
    #[case(1, 1, "Voters: 1, Left: 1")]
    #[case(12, 3, "Voters: 12, Left: 3")]
    fn tally_header(#[case] voters: usize, #[case] left: usize, #[case] expected: &str) {
        assert_eq!(tally_line(voters, left), expected);
    }

    #[test]
    fn empty_campaign() {
        let r = render(&campaign());
        assert!(r.text.contains("Voters: 0"));
        assert!(r.text.ends_with("No votes yet."));
        assert_eq!(r.vote_button.label, "✅ Vote (0)");
        assert_eq!(r.vote_button.callback_data, "vote:abcdefghij");
        assert_eq!(r.left_button.label, "🚪 Left: 0");
        assert_eq!(r.left_button.callback_data, NOOP_CALLBACK);
    }

    #[test]
    fn voters_listed_in_vote_order_with_left_marker() {
        let mut c = campaign();
        c.voters.push(VoterRecord::new(UserId(9), "Zed", None));
        c.voters.push(VoterRecord::new(UserId(2), "Ann", Some("ann".into())));
        c.left.insert(UserId(9));

        let r = render(&c);
        assert_eq!(
            r.text,
            "🗳 Subscribers-only vote\nVoters: 2, Left: 1\n\n1. Zed [left]\n2. Ann (@ann)"
        );
        assert_eq!(r.vote_button.label, "✅ Vote (2)");
        assert_eq!(r.left_button.label, "🚪 Left: 1");
    }

    #[test]
    fn large_tally_fits_in_one_message() {
        let mut c = campaign();
        for id in 1..=400 {
            c.voters.push(VoterRecord::new(
                UserId(id),
                format!("Voter with a fairly long display name {id}"),
                Some(format!("voter_username_{id}")),
            ));
        }
        c.left.insert(UserId(3));

        let text = render(&c).text;
        assert!(text.chars().count() <= TELEGRAM_MAX_MESSAGE_LEN);
        assert!(message_len(&text) <= TELEGRAM_MAX_MESSAGE_LEN);
        assert!(text.contains("Voters: 400, Left: 1"));
        assert!(text.contains("\n1. Voter with a fairly long display name 1 (@voter_username_1)"));
        assert!(text.contains("3 (@voter_username_3) [left]"));

        let shown = text.lines().filter(|l| l.starts_with(char::is_numeric)).count();
        assert!(shown > 0 && shown < 400);
        assert!(text.ends_with(&format!("…and {} more", 400 - shown)));
    }

    #[test]
    fn list_that_fits_has_no_overflow_line() {
        let mut c = campaign();
        for id in 1..=50 {
            c.voters.push(VoterRecord::new(UserId(id), format!("User {id}"), None));
        }
        let text = render(&c).text;
        assert!(text.ends_with("\n50. User 50"));
        assert!(!text.contains("more"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut c = campaign();
        c.voters.push(VoterRecord::new(UserId(2), "Ann", None));
        assert_eq!(render(&c), render(&c.clone()));
    }

    #[test]
    fn vote_callback_roundtrip() {
        let id = CampaignId::parse("abcdefghij").unwrap();
        assert_eq!(parse_vote_callback(&vote_callback_data(&id)), Some("abcdefghij"));
        assert_eq!(parse_vote_callback(NOOP_CALLBACK), None);
    }
}
