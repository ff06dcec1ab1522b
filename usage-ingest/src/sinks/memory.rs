use std::{collections::BTreeMap, sync::Arc};

use futures::StreamExt;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use usage_client::domain::Interval;

use crate::pipeline::{Envelope, PipelineError, Sink};

/// In-process interval store keyed by interval start. Used for dry runs and
/// tests; clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryIntervalStore {
    rows: Arc<Mutex<BTreeMap<OffsetDateTime, Interval>>>,
}

impl MemoryIntervalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored intervals, ascending by `ts`.
    pub async fn snapshot(&self) -> Vec<Interval> {
        self.rows.lock().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Sink<Interval> for MemoryIntervalStore {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Interval>, PipelineError>> + Send + Unpin + 'static,
    {
        let mut written: u64 = 0;
        while let Some(item) = input.next().await {
            match item {
                Ok(env) => {
                    let interval = env.payload;
                    self.rows.lock().await.insert(interval.ts, interval);
                    written += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for MemoryIntervalStore");
                }
            }
        }

        metrics::counter!("interval_store_upserted_records_total").increment(written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn interval(ts: OffsetDateTime, import_kwh: f64) -> Interval {
        Interval::new(ts, import_kwh, 0.0, 0.3, 0.08)
    }

    #[tokio::test]
    async fn upsert_replaces_same_timestamp() {
        let store = MemoryIntervalStore::new();
        let t0 = datetime!(2025-10-17 13:00 +11);
        let t1 = datetime!(2025-10-17 13:30 +11);
        let t2 = datetime!(2025-10-17 14:00 +11);

        let items = vec![
            Ok(Envelope::new(interval(t0, 1.0))),
            Err(PipelineError::Transform("dropped".into())),
            Ok(Envelope::new(interval(t1, 0.5))),
            Ok(Envelope::new(interval(t2, 0.2))),
            Ok(Envelope::new(interval(t0, 0.7))),
        ];
        store.run(futures::stream::iter(items)).await.unwrap();

        let all = store.snapshot().await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].import_kwh, 0.7);
        assert_eq!(all.iter().map(|it| it.ts).collect::<Vec<_>>(), vec![t0, t1, t2]);
    }
}
