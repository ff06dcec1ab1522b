use anyhow::{bail, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};
use usage_client::{aggregate, domain::Interval};
use usage_ingest::{
    config::{AppConfig, StoreKind},
    metrics_server,
    observability,
    pipeline::{Envelope, PipelineError, PullPipeline, Sink},
    sinks::{rebuild_daily_usage, MemoryIntervalStore, PostgresIntervalStore},
    sources::open_record_file,
    transform::{ChannelReader, IntervalValidation, PriceFeedReader},
};

enum IntervalStore {
    Postgres(PostgresIntervalStore),
    Memory(MemoryIntervalStore),
}

#[async_trait::async_trait]
impl Sink<Interval> for IntervalStore {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Interval>, PipelineError>> + Send + Unpin + 'static,
    {
        match self {
            Self::Postgres(s) => s.run(input).await,
            Self::Memory(s) => s.run(input).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let zone = cfg.zone()?;
    let pull_cfg = &cfg.pull;
    if pull_cfg.channels.is_empty() {
        bail!("no [[pull.channels]] configured");
    }

    let channels = pull_cfg
        .channels
        .iter()
        .map(|ch| (ch.kind, open_record_file(&ch.path, ch.format)))
        .collect();
    let prices = pull_cfg.prices.as_ref().map(|p| open_record_file(&p.path, p.format));

    let store_cfg = &cfg.store;
    let mut pool: Option<PgPool> = None;
    let mut dry_run: Option<MemoryIntervalStore> = None;
    let sink = match store_cfg.kind {
        StoreKind::Postgres => {
            let pg = PgPoolOptions::new()
                .max_connections(store_cfg.max_connections)
                .connect(store_cfg.uri()?)
                .await?;
            pool = Some(pg.clone());
            IntervalStore::Postgres(PostgresIntervalStore::new(
                pg,
                store_cfg.batch_size,
                store_cfg.max_retries,
                Duration::from_millis(store_cfg.retry_backoff_ms),
            ))
        }
        StoreKind::Memory => {
            let store = MemoryIntervalStore::new();
            dry_run = Some(store.clone());
            IntervalStore::Memory(store)
        }
    };

    let pipeline = PullPipeline {
        channels,
        prices,
        reader: ChannelReader::new(zone, cfg.site.price_unit),
        price_reader: PriceFeedReader::new(zone, cfg.site.price_unit),
        transforms: vec![Arc::new(IntervalValidation)],
        sink,
    };

    let report = pipeline.run().await?;
    tracing::info!(
        intervals = report.intervals,
        price_points = report.price_points,
        "pull complete"
    );

    if let Some(pool) = pool {
        let days = rebuild_daily_usage(&pool, zone).await?;
        tracing::info!(days, timezone = zone.name(), "daily_usage recomputed");
    }

    if let Some(store) = dry_run {
        let intervals = store.snapshot().await;
        let out = serde_json::json!({
            "report": report,
            "intervals": intervals,
            "summary": aggregate::summarize(&intervals),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
