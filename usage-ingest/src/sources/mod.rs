pub mod csv_file;
pub mod json_file;
pub mod static_records;

use std::{path::Path, sync::Arc};

pub use csv_file::CsvRecordFileSource;
pub use json_file::JsonRecordFileSource;
pub use static_records::StaticRecordSource;

use crate::pipeline::RecordSource;

/// On-disk layout of a saved record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// JSON array or newline-delimited JSON.
    #[default]
    Json,
    Csv,
    /// Pipe-delimited text.
    Dat,
}

pub fn open_record_file(path: &Path, format: RecordFormat) -> RecordSource {
    match format {
        RecordFormat::Json => Arc::new(JsonRecordFileSource::new(path)),
        RecordFormat::Csv => Arc::new(CsvRecordFileSource::new(path)),
        RecordFormat::Dat => Arc::new(CsvRecordFileSource::new(path).with_delimiter(b'|')),
    }
}
