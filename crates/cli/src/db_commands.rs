use {
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::info,
};

/// Open the campaign database and bring its schema up to date.
pub async fn open_database(url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await?;
    votegate_campaigns::run_migrations(&pool).await?;
    Ok(pool)
}

/// `votegate migrate`: run pending migrations and exit.
pub async fn migrate(url: &str) -> anyhow::Result<()> {
    let pool = open_database(url).await?;
    pool.close().await;
    info!(database_url = url, "migrations applied");
    println!("Database is up to date.");
    Ok(())
}
