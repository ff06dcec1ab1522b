use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::env;
use usage_client::db;
use usage_ingest::{config::AppConfig, observability, sinks::rebuild_daily_usage, transform::timestamp::parse_date};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let zone = cfg.zone()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.store.max_connections)
        .connect(cfg.store.uri()?)
        .await?;

    // Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
    let days = rebuild_daily_usage(&pool, zone).await?;
    tracing::info!(days, timezone = zone.name(), "daily_usage recomputed");

    // Optional `<start> <end>` prints the rebuilt rows for that span.
    let args: Vec<String> = env::args().collect();
    if let (Some(start), Some(end)) = (args.get(1), args.get(2)) {
        let rows = db::daily_usage(&pool, parse_date(start)?, parse_date(end)?).await?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }

    Ok(())
}
