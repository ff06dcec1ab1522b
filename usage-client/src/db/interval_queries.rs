use anyhow::Result;
use sqlx::PgPool;
use time::{Date, OffsetDateTime};

use crate::domain::{Interval, SiteZone};

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct DailyUsage {
    pub day: Date,
    pub import_kwh: f64,
    pub export_kwh: f64,
    pub cost: f64,
}

/// Fetch a time-ordered interval series, re-expressed in the site offset so
/// local hours and dates are correct downstream.
pub async fn load_intervals(
    pool: &PgPool,
    zone: SiteZone,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<Interval>> {
    let rows = sqlx::query_as::<_, Interval>(
        r#"
        SELECT
            ts,
            import_kwh,
            export_kwh,
            import_price,
            export_price,
            cost
        FROM intervals
        WHERE ts >= $1
          AND ts <  $2
        ORDER BY ts
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|mut row| {
            row.ts = zone.localize(row.ts);
            row
        })
        .collect())
}

/// Per-day totals read back from the `daily_usage` roll-up table, both
/// dates inclusive.
pub async fn daily_usage(pool: &PgPool, start: Date, end: Date) -> Result<Vec<DailyUsage>> {
    let rows = sqlx::query_as::<_, DailyUsage>(
        r#"
        SELECT
            day,
            import_kwh,
            export_kwh,
            cost
        FROM daily_usage
        WHERE day >= $1
          AND day <= $2
        ORDER BY day
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
