//! SQLite-backed campaign store using sqlx.
//!
//! Voters live in their own table keyed by `(campaign_id, user_id)`, so every
//! mutation is a single conditional statement rather than a rewrite of the
//! whole campaign. Vote order is the voter row's rowid.

use std::collections::BTreeSet;

use {
    async_trait::async_trait,
    sqlx::{SqliteConnection, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    store::{CampaignStore, Mutation},
    types::{Campaign, CampaignId, ChannelId, UserId, VoterRecord, now_secs},
};

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: String,
    channel_id: i64,
    creator_id: i64,
    created_at: i64,
    anchor_message_id: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct VoterRow {
    user_id: i64,
    display_name: String,
    username: Option<String>,
    left_at: Option<i64>,
}

/// SQLite-backed persistence for campaigns and their voters.
pub struct SqliteCampaignStore {
    pool: SqlitePool,
}

impl SqliteCampaignStore {
    /// Create a store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store on an existing pool. [`crate::run_migrations`] must
    /// already have run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn load(conn: &mut SqliteConnection, id: &CampaignId) -> Result<Option<Campaign>> {
    let Some(row) = sqlx::query_as::<_, CampaignRow>(
        "SELECT id, channel_id, creator_id, created_at, anchor_message_id
         FROM campaigns WHERE id = ?",
    )
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let voters = sqlx::query_as::<_, VoterRow>(
        "SELECT user_id, display_name, username, left_at
         FROM campaign_voters
         WHERE campaign_id = ?
         ORDER BY rowid",
    )
    .bind(id.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let left: BTreeSet<UserId> = voters
        .iter()
        .filter(|v| v.left_at.is_some())
        .map(|v| UserId(v.user_id))
        .collect();

    Ok(Some(Campaign {
        id: CampaignId::from_raw(row.id),
        channel_id: ChannelId(row.channel_id),
        creator_id: UserId(row.creator_id),
        created_at: row.created_at,
        anchor_message_id: row.anchor_message_id.map(|m| m as i32),
        voters: voters
            .into_iter()
            .map(|v| VoterRecord {
                user_id: UserId(v.user_id),
                display_name: v.display_name,
                username: v.username,
            })
            .collect(),
        left,
    }))
}

#[async_trait]
impl CampaignStore for SqliteCampaignStore {
    async fn insert(&self, campaign: &Campaign) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO campaigns (id, channel_id, creator_id, created_at, anchor_message_id)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(campaign.id.as_str())
        .bind(campaign.channel_id.0)
        .bind(campaign.creator_id.0)
        .bind(campaign.created_at)
        .bind(campaign.anchor_message_id.map(i64::from))
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let now = now_secs();
        for voter in &campaign.voters {
            let left_at = campaign.has_left(voter.user_id).then_some(now);
            sqlx::query(
                "INSERT INTO campaign_voters
                   (campaign_id, user_id, display_name, username, voted_at, left_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(campaign.id.as_str())
            .bind(voter.user_id.0)
            .bind(&voter.display_name)
            .bind(&voter.username)
            .bind(now)
            .bind(left_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn get(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, id).await
    }

    async fn set_anchor(&self, id: &CampaignId, message_id: i32) -> Result<Option<Mutation>> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE campaigns SET anchor_message_id = ?
             WHERE id = ? AND anchor_message_id IS NULL",
        )
        .bind(i64::from(message_id))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;
        let applied = result.rows_affected() == 1;
        let campaign = load(&mut tx, id).await?;
        tx.commit().await?;
        Ok(campaign.map(|campaign| Mutation { applied, campaign }))
    }

    async fn add_voter(&self, id: &CampaignId, voter: &VoterRecord) -> Result<Option<Mutation>> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO campaign_voters
               (campaign_id, user_id, display_name, username, voted_at, left_at)
             SELECT ?, ?, ?, ?, ?, NULL
             WHERE EXISTS (SELECT 1 FROM campaigns WHERE id = ?)
             ON CONFLICT(campaign_id, user_id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(voter.user_id.0)
        .bind(&voter.display_name)
        .bind(&voter.username)
        .bind(now_secs())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;
        let applied = result.rows_affected() == 1;
        let campaign = load(&mut tx, id).await?;
        tx.commit().await?;
        Ok(campaign.map(|campaign| Mutation { applied, campaign }))
    }

    async fn mark_left(&self, id: &CampaignId, user_id: UserId) -> Result<Option<Mutation>> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE campaign_voters SET left_at = ?
             WHERE campaign_id = ? AND user_id = ? AND left_at IS NULL",
        )
        .bind(now_secs())
        .bind(id.as_str())
        .bind(user_id.0)
        .execute(&mut *tx)
        .await?;
        let applied = result.rows_affected() == 1;
        let campaign = load(&mut tx, id).await?;
        tx.commit().await?;
        Ok(campaign.map(|campaign| Mutation { applied, campaign }))
    }

    async fn find_by_voter(
        &self,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> Result<Vec<CampaignId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT c.id FROM campaigns c
             JOIN campaign_voters v ON v.campaign_id = c.id
             WHERE c.channel_id = ? AND v.user_id = ?
             ORDER BY c.id",
        )
        .bind(channel_id.0)
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(CampaignId::from_raw).collect())
    }

    async fn creators(&self) -> Result<Vec<UserId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT creator_id FROM campaigns ORDER BY creator_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(UserId).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc};

    async fn make_store() -> SqliteCampaignStore {
        // One connection: every `sqlite::memory:` connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteCampaignStore::with_pool(pool)
    }

    fn make_campaign(id: &str, channel: i64) -> Campaign {
        Campaign::new(
            CampaignId::parse(id).unwrap(),
            ChannelId(channel),
            UserId(1),
            1000,
        )
    }

    fn voter(id: i64, name: &str) -> VoterRecord {
        VoterRecord::new(UserId(id), name, Some(name.to_lowercase()))
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = make_store().await;
        let c = make_campaign("abcdefghij", -100);
        assert!(store.insert(&c).await.unwrap());

        let got = store.get(&c.id).await.unwrap().unwrap();
        assert_eq!(got, c);
    }

    #[tokio::test]
    async fn insert_duplicate_id_is_rejected() {
        let store = make_store().await;
        let c = make_campaign("abcdefghij", -100);
        assert!(store.insert(&c).await.unwrap());
        assert!(!store.insert(&c).await.unwrap());
    }

    #[tokio::test]
    async fn voters_keep_vote_order() {
        let store = make_store().await;
        let c = make_campaign("abcdefghij", -100);
        store.insert(&c).await.unwrap();

        for (id, name) in [(30, "Cat"), (10, "Ann"), (20, "Bob")] {
            store.add_voter(&c.id, &voter(id, name)).await.unwrap();
        }

        let got = store.get(&c.id).await.unwrap().unwrap();
        let names: Vec<&str> = got.voters.iter().map(|v| v.display_name.as_str()).collect();
        assert_eq!(names, vec!["Cat", "Ann", "Bob"]);
    }

    #[tokio::test]
    async fn add_voter_twice_is_a_no_op() {
        let store = make_store().await;
        let c = make_campaign("abcdefghij", -100);
        store.insert(&c).await.unwrap();

        let first = store.add_voter(&c.id, &voter(7, "Ann")).await.unwrap().unwrap();
        assert!(first.applied);
        let second = store.add_voter(&c.id, &voter(7, "Ann")).await.unwrap().unwrap();
        assert!(!second.applied);
        assert_eq!(second.campaign.voter_count(), 1);
    }

    #[tokio::test]
    async fn add_voter_to_unknown_campaign() {
        let store = make_store().await;
        let id = CampaignId::parse("zzzzzzzzzz").unwrap();
        assert!(store.add_voter(&id, &voter(7, "Ann")).await.unwrap().is_none());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_left_only_for_voters_and_only_once() {
        let store = make_store().await;
        let c = make_campaign("abcdefghij", -100);
        store.insert(&c).await.unwrap();

        let not_voter = store.mark_left(&c.id, UserId(7)).await.unwrap().unwrap();
        assert!(!not_voter.applied);
        assert!(not_voter.campaign.left.is_empty());

        store.add_voter(&c.id, &voter(7, "Ann")).await.unwrap();
        let first = store.mark_left(&c.id, UserId(7)).await.unwrap().unwrap();
        assert!(first.applied);
        assert!(first.campaign.has_left(UserId(7)));

        let second = store.mark_left(&c.id, UserId(7)).await.unwrap().unwrap();
        assert!(!second.applied);
        assert_eq!(second.campaign.left_count(), 1);
    }

    #[tokio::test]
    async fn anchor_is_set_once() {
        let store = make_store().await;
        let c = make_campaign("abcdefghij", -100);
        store.insert(&c).await.unwrap();

        assert!(store.set_anchor(&c.id, 55).await.unwrap().unwrap().applied);
        let again = store.set_anchor(&c.id, 56).await.unwrap().unwrap();
        assert!(!again.applied);
        assert_eq!(again.campaign.anchor_message_id, Some(55));
    }

    #[tokio::test]
    async fn find_by_voter_scopes_to_channel() {
        let store = make_store().await;
        let a = make_campaign("aaaaaaaaaa", -100);
        let b = make_campaign("bbbbbbbbbb", -100);
        let other = make_campaign("cccccccccc", -200);
        for c in [&a, &b, &other] {
            store.insert(c).await.unwrap();
            store.add_voter(&c.id, &voter(7, "Ann")).await.unwrap();
        }
        store.add_voter(&a.id, &voter(8, "Bob")).await.unwrap();

        let ids = store.find_by_voter(ChannelId(-100), UserId(7)).await.unwrap();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone()]);
        let ids = store.find_by_voter(ChannelId(-100), UserId(8)).await.unwrap();
        assert_eq!(ids, vec![a.id.clone()]);
        assert!(
            store
                .find_by_voter(ChannelId(-300), UserId(7))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn creators_are_distinct() {
        let store = make_store().await;
        let mut a = make_campaign("aaaaaaaaaa", -100);
        a.creator_id = UserId(5);
        let mut b = make_campaign("bbbbbbbbbb", -100);
        b.creator_id = UserId(5);
        let mut c = make_campaign("cccccccccc", -100);
        c.creator_id = UserId(3);
        for campaign in [&a, &b, &c] {
            store.insert(campaign).await.unwrap();
        }
        assert_eq!(store.creators().await.unwrap(), vec![UserId(3), UserId(5)]);
    }

    #[tokio::test]
    async fn concurrent_distinct_voters_are_all_kept() {
        let store = Arc::new(make_store().await);
        let c = make_campaign("abcdefghij", -100);
        store.insert(&c).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = c.id.clone();
                tokio::spawn(async move {
                    store
                        .add_voter(&id, &voter(100 + i, &format!("U{i}")))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let got = store.get(&c.id).await.unwrap().unwrap();
        assert_eq!(got.voter_count(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_on_file_database_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("votes.db").display());
        let store = Arc::new(SqliteCampaignStore::new(&url).await.unwrap());
        let c = make_campaign("abcdefghij", -100);
        store.insert(&c).await.unwrap();

        // 100 distinct voters, plus user 7 voting 20 times at once.
        let attempts = (0..100)
            .map(|i| voter(1000 + i, &format!("U{i}")))
            .chain((0..20).map(|_| voter(7, "Repeat")));
        let results = futures::future::join_all(attempts.map(|v| {
            let store = Arc::clone(&store);
            let id = c.id.clone();
            tokio::spawn(async move { store.add_voter(&id, &v).await.unwrap().unwrap() })
        }))
        .await;

        let applied = results.into_iter().filter(|r| r.as_ref().unwrap().applied).count();
        assert_eq!(applied, 101);

        let got = store.get(&c.id).await.unwrap().unwrap();
        assert_eq!(got.voter_count(), 101);
        assert_eq!(got.voters.iter().filter(|v| v.user_id == UserId(7)).count(), 1);
        for i in 0..100 {
            assert!(got.has_voted(UserId(1000 + i)), "voter {i} lost");
        }
    }
}
