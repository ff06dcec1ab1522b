use anyhow::{bail, Result};
use sqlx::postgres::PgPoolOptions;
use std::env;
use usage_client::{aggregate, db};
use usage_ingest::{
    config::AppConfig,
    observability,
    transform::timestamp::{local_day_range, parse_date},
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: usage_summary <start YYYY-MM-DD> <end YYYY-MM-DD>");
    }

    let cfg = AppConfig::load()?;
    let zone = cfg.zone()?;
    let (start, end) = local_day_range(parse_date(&args[1])?, parse_date(&args[2])?, zone)?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.store.max_connections)
        .connect(cfg.store.uri()?)
        .await?;

    let intervals = db::load_intervals(&pool, zone, start, end).await?;
    let summary = aggregate::summarize(&intervals);
    tracing::info!(intervals = intervals.len(), days = summary.daily.len(), "usage summarized");

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
