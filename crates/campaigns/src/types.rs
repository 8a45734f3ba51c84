use std::{collections::BTreeSet, fmt};

use {
    rand::{Rng, distr::Alphanumeric},
    serde::{Deserialize, Serialize},
};

/// Length of a generated campaign id. 62^10 is roughly 2^59 distinct ids.
const CAMPAIGN_ID_LEN: usize = 10;

/// Opaque campaign token used in share links and callback payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignId(String);

impl CampaignId {
    /// Draw a fresh random id.
    pub fn generate() -> Self {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(CAMPAIGN_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Parse an id received from a link or callback payload.
    ///
    /// Returns `None` for anything that could not have been produced by
    /// [`CampaignId::generate`], so garbled payloads never reach the store.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == CAMPAIGN_ID_LEN && raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    /// Rebuild an id read back from storage.
    pub(crate) fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CampaignId> for String {
    fn from(id: CampaignId) -> Self {
        id.0
    }
}

/// Platform user identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform channel identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single accepted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl VoterRecord {
    pub fn new(user_id: UserId, display_name: impl Into<String>, username: Option<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            username,
        }
    }
}

/// One voting post and its tally state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub channel_id: ChannelId,
    pub creator_id: UserId,
    /// Unix seconds.
    pub created_at: i64,
    /// The tally message inside the channel. `None` only between the initial
    /// insert and the first post.
    pub anchor_message_id: Option<i32>,
    /// Voters in vote order. User ids are unique.
    pub voters: Vec<VoterRecord>,
    /// Voters confirmed to have left the channel. Always a subset of `voters`.
    pub left: BTreeSet<UserId>,
}

impl Campaign {
    pub fn new(id: CampaignId, channel_id: ChannelId, creator_id: UserId, created_at: i64) -> Self {
        Self {
            id,
            channel_id,
            creator_id,
            created_at,
            anchor_message_id: None,
            voters: Vec::new(),
            left: BTreeSet::new(),
        }
    }

    pub fn has_voted(&self, user_id: UserId) -> bool {
        self.voters.iter().any(|v| v.user_id == user_id)
    }

    pub fn has_left(&self, user_id: UserId) -> bool {
        self.left.contains(&user_id)
    }

    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    pub fn left_count(&self) -> usize {
        self.left.len()
    }

    /// Per-user position in the `NotVoted -> Voted -> VotedAndLeft` machine.
    pub fn voter_state(&self, user_id: UserId) -> VoterState {
        if self.has_left(user_id) {
            VoterState::VotedAndLeft
        } else if self.has_voted(user_id) {
            VoterState::Voted
        } else {
            VoterState::NotVoted
        }
    }
}

/// State of a (campaign, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoterState {
    NotVoted,
    Voted,
    /// Terminal.
    VotedAndLeft,
}

/// A user's standing in a channel as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
    Unknown,
}

impl MembershipStatus {
    /// Anything other than left, kicked or unknown counts as a member.
    pub fn is_member(self) -> bool {
        !matches!(self, Self::Left | Self::Kicked | Self::Unknown)
    }

    /// Statuses that mark an existing voter as departed.
    pub fn is_departure(self) -> bool {
        matches!(self, Self::Left | Self::Kicked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Administrator => "administrator",
            Self::Member => "member",
            Self::Restricted => "restricted",
            Self::Left => "left",
            Self::Kicked => "kicked",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a vote attempt. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    Recorded,
    AlreadyVoted,
    NotAMember,
    UnknownCampaign,
}

/// Current time as Unix seconds.
pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn generated_ids_parse_back() {
        let id = CampaignId::generate();
        assert_eq!(id.as_str().len(), CAMPAIGN_ID_LEN);
        assert_eq!(CampaignId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(CampaignId::generate(), CampaignId::generate());
    }

    #[rstest]
    #[case("")]
    #[case("short")]
    #[case("abc!defghi")]
    #[case("abcdefghijk")]
    fn garbled_ids_are_rejected(#[case] raw: &str) {
        assert!(CampaignId::parse(raw).is_none());
    }

    #[rstest]
    #[case(MembershipStatus::Owner, true)]
    #[case(MembershipStatus::Administrator, true)]
    #[case(MembershipStatus::Member, true)]
    #[case(MembershipStatus::Restricted, true)]
    #[case(MembershipStatus::Left, false)]
    #[case(MembershipStatus::Kicked, false)]
    #[case(MembershipStatus::Unknown, false)]
    fn membership_classes(#[case] status: MembershipStatus, #[case] member: bool) {
        assert_eq!(status.is_member(), member);
        assert_eq!(
            status.is_departure(),
            matches!(status, MembershipStatus::Left | MembershipStatus::Kicked)
        );
    }

    #[test]
    fn voter_state_follows_voters_and_left() {
        let mut c = Campaign::new(CampaignId::generate(), ChannelId(-100), UserId(1), 0);
        assert_eq!(c.voter_state(UserId(7)), VoterState::NotVoted);
        c.voters.push(VoterRecord::new(UserId(7), "Ann", None));
        assert_eq!(c.voter_state(UserId(7)), VoterState::Voted);
        c.left.insert(UserId(7));
        assert_eq!(c.voter_state(UserId(7)), VoterState::VotedAndLeft);
    }
}
