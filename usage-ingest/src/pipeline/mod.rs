use std::{collections::BTreeMap, pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use usage_client::domain::{ChannelKind, ChannelReading, Interval, PricePoint};

use crate::transform::{self, ChannelReader, ChannelReadings, PriceFeedReader, RawRecord};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("no usable usage data in any channel")]
    NoUsableData,
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub type RecordSource = Arc<dyn Source<RawRecord>>;

/// Outcome of one pull.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PullReport {
    pub readings: BTreeMap<ChannelKind, usize>,
    pub price_points: usize,
    pub intervals: usize,
}

/// One pull over a date range: every channel source is drained on its own
/// task, then readings are reconciled, priced and handed to the sink.
pub struct PullPipeline<K> {
    pub channels: Vec<(ChannelKind, RecordSource)>,
    pub prices: Option<RecordSource>,
    pub reader: ChannelReader,
    pub price_reader: PriceFeedReader,
    pub transforms: Vec<Arc<dyn Transform<Interval, Interval> + Send + Sync>>, // same-type transforms chain
    pub sink: K,
}

impl<K> PullPipeline<K>
where
    K: Sink<Interval> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<PullReport, PipelineError> {
        let workers: Vec<_> = self
            .channels
            .into_iter()
            .map(|(kind, source)| {
                let reader = self.reader;
                tokio::spawn(async move { (kind, read_channel(kind, source, reader).await) })
            })
            .collect();

        // The price feed is drained while the channel workers run.
        let price_points = match self.prices {
            Some(source) => read_prices(source, self.price_reader).await,
            None => Vec::new(),
        };

        let mut readings = ChannelReadings::new();
        for worker in futures::future::join_all(workers).await {
            let (kind, channel) = worker.map_err(|e| PipelineError::Source(format!("channel worker failed: {e}")))?;
            readings.entry(kind).or_default().extend(channel);
        }

        let mut report = PullReport {
            readings: readings.iter().map(|(kind, r)| (*kind, r.len())).collect(),
            price_points: price_points.len(),
            intervals: 0,
        };
        if readings.values().all(Vec::is_empty) {
            return Err(PipelineError::NoUsableData);
        }

        let tariffs = transform::index(price_points);
        let intervals = transform::reconcile_and_index(&readings, &tariffs);
        report.intervals = intervals.len();
        tracing::info!(
            intervals = report.intervals,
            price_points = report.price_points,
            "reconciled pull"
        );

        let mut stream: Pin<Box<dyn Stream<Item = Result<Envelope<Interval>, PipelineError>> + Send>> =
            Box::pin(futures::stream::iter(intervals.into_values().map(|it| Ok(Envelope::new(it)))));

        // Apply transforms in sequence (if any).
        for t in self.transforms {
            let t_arc = t.clone();
            stream = Box::pin(stream.then(move |item| {
                let t_inner = t_arc.clone();
                async move {
                    match item {
                        Ok(env) => t_inner.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        self.sink.run(stream).await?;
        Ok(report)
    }
}

/// Drains one channel. A failing source is logged and contributes whatever
/// it produced before failing; bad records are skipped.
async fn read_channel(kind: ChannelKind, source: RecordSource, reader: ChannelReader) -> Vec<ChannelReading> {
    let records = drain(source, kind.as_str()).await;
    let readings = reader.read_all(&records, kind);
    tracing::debug!(channel = %kind, records = records.len(), readings = readings.len(), "channel read");
    readings
}

async fn read_prices(source: RecordSource, reader: PriceFeedReader) -> Vec<PricePoint> {
    let records = drain(source, "prices").await;
    reader.read_all(&records)
}

async fn drain(source: RecordSource, label: &'static str) -> Vec<RawRecord> {
    let mut stream = source.stream().await;
    let mut records = Vec::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(env) => records.push(env.payload),
            Err(e) => {
                tracing::warn!(source = label, error = %e, "record source error");
                metrics::counter!("record_source_errors_total", "source" => label).increment(1);
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sinks::MemoryIntervalStore, sources::StaticRecordSource, transform::IntervalValidation};
    use serde_json::json;
    use time::macros::datetime;
    use usage_client::domain::{PriceUnit, SiteZone};

    fn records(values: Vec<serde_json::Value>) -> RecordSource {
        Arc::new(StaticRecordSource::new(
            values.into_iter().filter_map(|v| v.as_object().cloned()).collect(),
        ))
    }

    fn pipeline(
        channels: Vec<(ChannelKind, RecordSource)>,
        prices: Option<RecordSource>,
        store: MemoryIntervalStore,
    ) -> PullPipeline<MemoryIntervalStore> {
        let zone = SiteZone::default();
        PullPipeline {
            channels,
            prices,
            reader: ChannelReader::new(zone, PriceUnit::Cents),
            price_reader: PriceFeedReader::new(zone, PriceUnit::Cents),
            transforms: vec![Arc::new(IntervalValidation)],
            sink: store,
        }
    }

    #[tokio::test]
    async fn pull_reconciles_prices_and_stores_intervals() {
        let general = records(vec![
            json!({ "startTime": "2025-10-17T02:00:00Z", "kwh": 1.2, "perKwh": 40.0 }),
            json!({ "startTime": "2025-10-17T02:30:00Z", "kwh": 0.1, "perKwh": 40.0 }),
            json!({ "startTime": "broken", "kwh": 5.0 }),
        ]);
        let feed_in = records(vec![json!({ "startTime": "2025-10-17T02:30:00Z", "kwh": 0.6, "perKwh": 8.0 })]);
        let prices = records(vec![
            json!({ "channelType": "general", "startTime": "2025-10-17T02:00:00Z", "perKwh": 30.0 }),
            json!({ "channelType": "feedIn", "startTime": "2025-10-17T02:00:00Z", "perKwh": 10.0 }),
        ]);

        let store = MemoryIntervalStore::new();
        let report = pipeline(
            vec![(ChannelKind::General, general), (ChannelKind::FeedIn, feed_in)],
            Some(prices),
            store.clone(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.readings[&ChannelKind::General], 2);
        assert_eq!(report.price_points, 1);
        assert_eq!(report.intervals, 2);

        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.ts, datetime!(2025-10-17 13:00 +11));
        assert_eq!(first.import_price, 0.30);
        assert!((first.cost - 1.2 * 0.30).abs() < 1e-9);

        let second = &rows[1];
        assert_eq!(second.import_kwh, 0.0);
        assert!((second.export_kwh - 0.5).abs() < 1e-9);
        assert_eq!(second.export_price, 0.08);
    }

    #[tokio::test]
    async fn general_only_price_feed_leaves_feed_in_price_from_the_reading() {
        let general = records(vec![json!({ "startTime": "2025-10-17T02:00:01Z", "kwh": 0.2, "perKwh": 40.0 })]);
        let feed_in = records(vec![json!({ "startTime": "2025-10-17T02:00:01Z", "kwh": 1.0, "perKwh": 7.0 })]);
        let prices = records(vec![json!({ "channelType": "general", "startTime": "2025-10-17T02:00:01Z", "perKwh": 30.0 })]);

        let store = MemoryIntervalStore::new();
        pipeline(
            vec![(ChannelKind::General, general), (ChannelKind::FeedIn, feed_in)],
            Some(prices),
            store.clone(),
        )
        .run()
        .await
        .unwrap();

        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].import_price, 0.30);
        assert_eq!(rows[0].export_price, 0.07);
        assert!((rows[0].cost + 0.8 * 0.07).abs() < 1e-9);
    }

    #[tokio::test]
    async fn pulls_overwrite_earlier_rows_for_the_same_interval() {
        let store = MemoryIntervalStore::new();
        let first = records(vec![json!({ "startTime": "2025-10-17T02:00:00Z", "kwh": 1.0 })]);
        let second = records(vec![json!({ "startTime": "2025-10-17T02:00:00Z", "kwh": 0.4 })]);

        for source in [first, second] {
            pipeline(vec![(ChannelKind::General, source)], None, store.clone())
                .run()
                .await
                .unwrap();
        }

        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].import_kwh, 0.4);
    }

    #[tokio::test]
    async fn empty_channels_are_a_whole_batch_failure() {
        let store = MemoryIntervalStore::new();
        let result = pipeline(
            vec![
                (ChannelKind::General, records(vec![json!({ "startTime": "nope" })])),
                (ChannelKind::FeedIn, records(vec![])),
            ],
            None,
            store.clone(),
        )
        .run()
        .await;

        assert!(matches!(result, Err(PipelineError::NoUsableData)));
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn one_empty_channel_contributes_nothing() {
        let store = MemoryIntervalStore::new();
        let report = pipeline(
            vec![
                (ChannelKind::General, records(vec![json!({ "startTime": "2025-10-17T02:00:00Z", "kwh": 0.3 })])),
                (ChannelKind::BatteryDischarge, records(vec![])),
            ],
            None,
            store.clone(),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.intervals, 1);
        assert_eq!(store.snapshot().await[0].import_kwh, 0.3);
    }
}
