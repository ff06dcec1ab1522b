use std::pin::Pin;

use futures::Stream;

use crate::{
    pipeline::{Envelope, PipelineError, Source},
    transform::RawRecord,
};

/// Records a caller already fetched in-process, replayed as a source.
#[derive(Debug, Clone, Default)]
pub struct StaticRecordSource {
    records: Vec<RawRecord>,
}

impl StaticRecordSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }
}

#[async_trait::async_trait]
impl Source<RawRecord> for StaticRecordSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<RawRecord>, PipelineError>> + Send>> {
        let items: Vec<_> = self.records.iter().cloned().map(|r| Ok(Envelope::new(r))).collect();
        Box::pin(futures::stream::iter(items))
    }
}
