pub mod channel;
pub mod prices;
pub mod reconcile;
pub mod timestamp;

use std::collections::BTreeMap;

use time::{macros::datetime, OffsetDateTime};
use usage_client::domain::{ChannelKind, Interval};

use crate::pipeline::{Envelope, PipelineError, Transform};

pub use channel::ChannelReader;
pub use prices::{index, PriceFeedReader, Tariff};
pub use reconcile::{reconcile, ChannelReadings, GridExchange};

/// An upstream record as received: field names and value types vary.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Joins the reconciled grid exchange with prices, producing store-ready
/// intervals in ascending timestamp order.
///
/// Price precedence per side: price feed, then the price embedded in the
/// `general` (import) or `feed_in` (export) reading, then zero.
pub fn reconcile_and_index(
    readings: &ChannelReadings,
    tariffs: &BTreeMap<OffsetDateTime, Tariff>,
) -> BTreeMap<OffsetDateTime, Interval> {
    let embedded = embedded_tariffs(readings);

    reconcile(readings)
        .into_iter()
        .map(|(ts, exchange)| {
            let feed = tariffs.get(&ts).copied().unwrap_or_default();
            let own = embedded.get(&ts).copied().unwrap_or_default();
            let interval = Interval::new(
                ts,
                exchange.import_kwh,
                exchange.export_kwh,
                feed.import_price.or(own.import_price).unwrap_or(0.0),
                feed.export_price.or(own.export_price).unwrap_or(0.0),
            );
            (ts, interval)
        })
        .collect()
}

/// Prices carried on the usage records themselves. Last reading wins.
fn embedded_tariffs(readings: &ChannelReadings) -> BTreeMap<OffsetDateTime, Tariff> {
    let mut tariffs: BTreeMap<OffsetDateTime, Tariff> = BTreeMap::new();

    for reading in readings.get(&ChannelKind::General).into_iter().flatten() {
        tariffs.entry(reading.ts).or_default().import_price = Some(reading.price_per_kwh);
    }
    for reading in readings.get(&ChannelKind::FeedIn).into_iter().flatten() {
        tariffs.entry(reading.ts).or_default().export_price = Some(reading.price_per_kwh);
    }

    tariffs
}

/// Pure validation of a reconciled `Interval` before it is stored.
///
/// Rules:
/// - quantities and prices must be finite, quantities non-negative.
/// - import and export cannot both be non-zero.
/// - ts must be within a broad sanity window [2000-01-01, 2100-01-01].
pub fn validate_interval(env: Envelope<Interval>) -> Result<Envelope<Interval>, PipelineError> {
    let it = &env.payload;

    let fields = [it.import_kwh, it.export_kwh, it.import_price, it.export_price];
    if fields.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::Transform("non-finite interval field".to_string()));
    }

    if it.import_kwh < 0.0 || it.export_kwh < 0.0 {
        return Err(PipelineError::Transform("kwh must be non-negative".to_string()));
    }

    if it.import_kwh != 0.0 && it.export_kwh != 0.0 {
        return Err(PipelineError::Transform("interval cannot both import and export".to_string()));
    }

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if it.ts < min_ts || it.ts > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct IntervalValidation;

#[async_trait::async_trait]
impl Transform<Interval, Interval> for IntervalValidation {
    async fn apply(&self, input: Envelope<Interval>) -> Result<Envelope<Interval>, PipelineError> {
        match validate_interval(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_interval_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
