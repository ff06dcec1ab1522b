use std::time::Duration;

use futures::StreamExt;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};
use usage_client::domain::{Interval, SiteZone};

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Interval store over PostgreSQL. Rows are keyed by `ts`; writing an
/// existing interval replaces every column (last write wins).
///
/// Schema is expected to be applied out-of-band via `sql/schema/*.sql`.
pub struct PostgresIntervalStore {
    pool: PgPool,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PostgresIntervalStore {
    pub fn new(pool: PgPool, batch_size: usize, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            max_retries,
            retry_backoff,
        }
    }

    async fn flush_batch(&self, batch: &[Envelope<Interval>]) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            let res = self.upsert_batch(batch).await;
            match res {
                Ok(()) => {
                    metrics::counter!("interval_store_upserted_records_total").increment(batch.len() as u64);

                    // Approximate end-to-end latency from earliest received_at to now.
                    if let Some(min_received) = batch.iter().map(|e| e.received_at).min() {
                        if let Ok(dur) = std::time::SystemTime::now().duration_since(min_received) {
                            metrics::histogram!("interval_store_write_latency_seconds").record(dur.as_secs_f64());
                        }
                    }

                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "interval upsert failed, retrying with backoff"
                    );
                    metrics::counter!("interval_store_retry_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "interval upsert failed, giving up");
                    metrics::counter!("interval_store_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    async fn upsert_batch(&self, batch: &[Envelope<Interval>]) -> Result<(), sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO intervals (ts, import_kwh, export_kwh, import_price, export_price, cost) ",
        );

        builder.push_values(batch, |mut b, env| {
            let it = &env.payload;
            b.push_bind(it.ts)
                .push_bind(it.import_kwh)
                .push_bind(it.export_kwh)
                .push_bind(it.import_price)
                .push_bind(it.export_price)
                .push_bind(it.cost);
        });
        builder.push(
            " ON CONFLICT (ts) DO UPDATE SET \
               import_kwh = EXCLUDED.import_kwh, \
               export_kwh = EXCLUDED.export_kwh, \
               import_price = EXCLUDED.import_price, \
               export_price = EXCLUDED.export_price, \
               cost = EXCLUDED.cost",
        );

        let query = builder.build();
        query.execute(&self.pool).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl Sink<Interval> for PostgresIntervalStore {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Interval>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut buffer: Vec<Envelope<Interval>> = Vec::with_capacity(self.batch_size);

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for PostgresIntervalStore");
                    continue;
                }
            };

            buffer.push(env);
            if buffer.len() >= self.batch_size {
                self.flush_batch(&buffer).await?;
                buffer.clear();
            }
        }

        if !buffer.is_empty() {
            self.flush_batch(&buffer).await?;
        }

        Ok(())
    }
}

/// Recomputes the `daily_usage` roll-up from `intervals`, bucketing by the
/// site's local calendar date. Returns the number of days written.
pub async fn rebuild_daily_usage(pool: &PgPool, zone: SiteZone) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM daily_usage").execute(&mut *tx).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO daily_usage (day, import_kwh, export_kwh, cost)
        SELECT
            (ts AT TIME ZONE $1)::date AS day,
            SUM(import_kwh)           AS import_kwh,
            SUM(export_kwh)           AS export_kwh,
            SUM(cost)                 AS cost
        FROM intervals
        GROUP BY 1
        "#,
    )
    .bind(zone.name())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok(inserted)
}
