use std::{
    fs::File,
    path::{Path, PathBuf},
    pin::Pin,
};

use csv::StringRecord;
use futures::Stream;
use serde_json::Value;

use crate::{
    pipeline::{Envelope, PipelineError, Source},
    transform::RawRecord,
};

/// Delimited-text export of upstream records.
///
/// The header row supplies the field names, so any upstream spelling
/// (`kwh`, `usageKwh`, `startTime`, `nemTime`, ...) passes through to the
/// channel reader unchanged. Empty cells are left out of the record.
/// Comma-separated by default; `.dat` exports use `|`.
pub struct CsvRecordFileSource {
    path: PathBuf,
    delimiter: u8,
}

impl CsvRecordFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

fn record_to_raw(record: &StringRecord, headers: &StringRecord) -> RawRecord {
    headers
        .iter()
        .zip(record.iter())
        .filter_map(|(name, cell)| {
            let trimmed = cell.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some((name.trim().to_string(), Value::String(trimmed.to_string())))
            }
        })
        .collect()
}

/// Reads the whole file with the blocking `csv` reader. A missing file or
/// bad header is a single error; a bad row is an error in its place.
fn read_records(path: &Path, delimiter: u8) -> Vec<Result<RawRecord, PipelineError>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            return vec![Err(PipelineError::Source(format!(
                "failed to open CSV file {}: {e}",
                path.display()
            )))]
        }
    };
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(file);
    let headers = match rdr.headers() {
        Ok(h) => h.clone(),
        Err(e) => return vec![Err(PipelineError::Source(format!("failed to read CSV headers: {e}")))],
    };

    rdr.records()
        .map(|result| match result {
            Ok(record) => Ok(record_to_raw(&record, &headers)),
            Err(e) => {
                metrics::counter!("record_csv_parse_errors_total").increment(1);
                Err(PipelineError::Source(format!("failed to read CSV record: {e}")))
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl Source<RawRecord> for CsvRecordFileSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<RawRecord>, PipelineError>> + Send>> {
        let path = self.path.clone();
        let delimiter = self.delimiter;
        let s = async_stream::stream! {
            match tokio::task::spawn_blocking(move || read_records(&path, delimiter)).await {
                Ok(items) => {
                    for item in items {
                        yield item.map(Envelope::new);
                    }
                }
                Err(e) => yield Err(PipelineError::Source(format!("CSV reader task failed: {e}"))),
            }
        };

        Box::pin(s)
    }
}
