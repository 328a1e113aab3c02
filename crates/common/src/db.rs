use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open the connection pool backing the delivery ledger.
///
/// `max_connections` should come from `AppConfig::db_max_connections`. The
/// pool is shared by every dispatch worker, so size it for the expected
/// worker count.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Delivery ledger database connected");
    Ok(pool)
}
