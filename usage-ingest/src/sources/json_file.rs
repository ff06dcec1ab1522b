use std::{path::PathBuf, pin::Pin};

use async_stream::stream;
use futures::Stream;
use serde_json::Value;
use tokio::fs;

use crate::{
    pipeline::{Envelope, PipelineError, Source},
    transform::RawRecord,
};

/// File of raw upstream records as saved from the retailer API.
///
/// Accepts either a JSON array of objects (the API response body as-is) or
/// newline-delimited JSON with one object per line. A bad line or element
/// is reported and skipped; the rest of the file is still read.
pub struct JsonRecordFileSource {
    path: PathBuf,
}

impl JsonRecordFileSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

fn into_record(value: Value) -> Result<RawRecord, PipelineError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PipelineError::Source(format!("expected a JSON object record, got {other}"))),
    }
}

/// Splits a document into per-record results.
pub fn parse_records(contents: &str) -> Vec<Result<RawRecord, PipelineError>> {
    if contents.trim_start().starts_with('[') {
        return match serde_json::from_str::<Vec<Value>>(contents) {
            Ok(values) => values.into_iter().map(into_record).collect(),
            Err(e) => vec![Err(PipelineError::Source(format!("failed to parse JSON array: {e}")))],
        };
    }

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<Value>(line)
                .map_err(|e| PipelineError::Source(format!("failed to parse json line: {e}")))
                .and_then(into_record)
        })
        .collect()
}

#[async_trait::async_trait]
impl Source<RawRecord> for JsonRecordFileSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<RawRecord>, PipelineError>> + Send>> {
        let path = self.path.clone();
        let s = stream! {
            let contents = match fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    yield Err(PipelineError::Source(format!(
                        "failed to open record file {}: {e}",
                        path.display()
                    )));
                    return;
                }
            };

            for parsed in parse_records(&contents) {
                if parsed.is_err() {
                    metrics::counter!("record_file_parse_errors_total").increment(1);
                }
                yield parsed.map(Envelope::new);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_api_response_array() {
        let body = r#"[
            {"type": "Usage", "startTime": "2025-10-17T02:00:01Z", "kwh": 0.3},
            {"type": "Usage", "startTime": "2025-10-17T02:30:01Z", "kwh": 0.2},
            42
        ]"#;

        let parsed = parse_records(body);
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        assert_eq!(parsed[1].as_ref().unwrap()["kwh"], 0.2);
        assert!(matches!(parsed[2], Err(PipelineError::Source(_))));
    }

    #[test]
    fn parses_ndjson_and_skips_bad_lines() {
        let body = "{\"nemTime\": \"2025-10-17T13:00:00+11:00\", \"kwh\": 1}\n\nnot json\n{\"kwh\": 2}\n";

        let parsed = parse_records(body);
        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_ok());
        assert!(parsed[1].is_err());
        assert_eq!(parsed[2].as_ref().unwrap()["kwh"], 2);
    }

    #[test]
    fn truncated_array_is_a_single_error() {
        let parsed = parse_records("[{\"kwh\": 1},");
        assert_eq!(parsed.len(), 1);
        assert!(parsed[0].is_err());
    }

    #[tokio::test]
    async fn missing_file_yields_one_source_error() {
        use futures::StreamExt;

        let source = JsonRecordFileSource::new("/nonexistent/usage-general.json");
        let items: Vec<_> = source.stream().await.collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(PipelineError::Source(_))));
    }
}
