//! Run reporting: manifest printing and a CSV history of build runs.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::package::Manifest;
use crate::pipeline::{Outcome, PipelineError};
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One row of the run history.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub outcome: String,
    pub stage: Option<String>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub fingerprint: Option<String>,
    pub tag: Option<String>,
    pub size_uncompressed: Option<u64>,
    pub size_compressed: Option<u64>,
}

impl RunRecord {
    pub fn from_result(result: &Result<Outcome, PipelineError>) -> Self {
        let mut record = Self {
            timestamp: Utc::now(),
            ..Default::default()
        };
        match result {
            Ok(outcome) => {
                record.outcome = outcome.label().to_string();
                record.fingerprint = Some(outcome.fingerprint().to_string());
                if let Outcome::Published { manifest, tag } = outcome {
                    record.tag = Some(tag.clone());
                    record.size_uncompressed = Some(manifest.size_uncompressed);
                    record.size_compressed = Some(manifest.size_compressed);
                }
            }
            Err(e) => {
                record.outcome = "failed".to_string();
                record.stage = Some(e.stage.to_string());
                record.error_kind = Some(e.source.kind().to_string());
                record.error = Some(e.source.to_string());
            }
        }
        record
    }
}

/// Logs a manifest as pretty-printed JSON.
pub fn print_json(manifest: &Manifest) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(manifest)?);
    Ok(())
}

/// Appends a [`RunRecord`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &Path, record: &RunRecord) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending run record");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}
