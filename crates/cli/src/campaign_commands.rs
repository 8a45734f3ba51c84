use {
    anyhow::Context,
    votegate_campaigns::{
        CampaignId, render::render, store::CampaignStore, store_sqlite::SqliteCampaignStore,
    },
};

use crate::db_commands::open_database;

/// `votegate show <id>`: print a stored campaign and its rendered tally.
pub async fn show(url: &str, raw_id: &str) -> anyhow::Result<()> {
    let id = CampaignId::parse(raw_id).with_context(|| format!("invalid campaign id: {raw_id}"))?;
    let store = SqliteCampaignStore::with_pool(open_database(url).await?);

    let Some(campaign) = store.get(&id).await? else {
        anyhow::bail!("campaign {id} not found");
    };

    println!("{}", serde_json::to_string_pretty(&campaign)?);
    println!();
    println!("{}", render(&campaign).text);
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        votegate_campaigns::{Campaign, ChannelId, UserId},
    };

    fn database_url(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join("votegate.db").display())
    }

    #[tokio::test]
    async fn show_rejects_garbled_id() {
        let dir = tempfile::tempdir().unwrap();
        let err = show(&database_url(&dir), "../etc").await.unwrap_err();
        assert!(err.to_string().contains("invalid campaign id"));
    }

    #[tokio::test]
    async fn show_reports_missing_campaign() {
        let dir = tempfile::tempdir().unwrap();
        let err = show(&database_url(&dir), "abcdefghij").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn show_prints_stored_campaign() {
        let dir = tempfile::tempdir().unwrap();
        let url = database_url(&dir);
        let store = SqliteCampaignStore::with_pool(open_database(&url).await.unwrap());
        let campaign = Campaign::new(
            CampaignId::parse("abcdefghij").unwrap(),
            ChannelId(-100),
            UserId(1),
            0,
        );
        store.insert(&campaign).await.unwrap();

        show(&url, "abcdefghij").await.unwrap();
    }
}
