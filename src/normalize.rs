//! Parses a feed archive into the fixed entity tables.
//!
//! Each entity file is delimited text with a header row. Header names are
//! matched case-sensitively, unknown columns are ignored, and absent or
//! empty cells take their column's declared default.

use std::io::{Cursor, Read, Seek};

use csv::StringRecord;
use serde::Deserialize;
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::MalformedFeedError;
use crate::schema::Record;
use crate::store::Tables;

const FEED_INFO_FILE: &str = "feed_info.txt";

/// Publisher-supplied identification, read from `feed_info.txt` when present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedInfo {
    pub feed_publisher_name: String,
    pub feed_version: String,
}

/// Output of normalization: the tables plus whatever feed metadata was found.
#[derive(Debug, Clone)]
pub struct NormalizedFeed {
    pub tables: Tables,
    pub feed_info: Option<FeedInfo>,
}

/// Opens `bytes` as a zip archive and reads every entity table.
#[tracing::instrument(skip(bytes), fields(bytes = bytes.len()))]
pub fn normalize(bytes: &[u8]) -> Result<NormalizedFeed, MalformedFeedError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    debug!(entries = archive.len(), "Feed archive opened");

    let tables = Tables {
        agency: read_table(&mut archive)?,
        routes: read_table(&mut archive)?,
        trips: read_table(&mut archive)?,
        stops: read_table(&mut archive)?,
        stop_times: read_table(&mut archive)?,
        calendar: read_table(&mut archive)?,
        calendar_dates: read_table(&mut archive)?,
        shapes: read_table(&mut archive)?,
    };
    let feed_info = read_feed_info(&mut archive);

    Ok(NormalizedFeed { tables, feed_info })
}

fn read_table<R, S>(archive: &mut ZipArchive<S>) -> Result<Vec<R>, MalformedFeedError>
where
    R: Record,
    S: Read + Seek,
{
    let table = R::TABLE;
    let file_name = table.file_name();

    match archive.by_name(file_name) {
        Ok(file) => parse_rows(file),
        Err(ZipError::FileNotFound) if table.is_required() => {
            Err(MalformedFeedError::MissingFile(file_name))
        }
        Err(ZipError::FileNotFound) => {
            info!(file = file_name, "Optional file absent, table left empty");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Parses one entity file into records of `R`, preserving source row order.
pub fn parse_rows<R: Record>(source: impl Read) -> Result<Vec<R>, MalformedFeedError> {
    let table = R::TABLE;
    let file = table.file_name();

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(source);

    let headers: StringRecord = reader
        .headers()
        .map_err(|source| MalformedFeedError::Header { file, source })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}'))
        .collect();

    let has_column = |name: &str| headers.iter().any(|h| h == name);

    if let Some(column) = table
        .primary_key()
        .iter()
        .copied()
        .find(|key| !has_column(key))
    {
        return Err(MalformedFeedError::MissingKeyColumn { file, column });
    }

    let missing: Vec<&str> = table
        .columns()
        .iter()
        .map(|c| c.name)
        .filter(|name| !has_column(name))
        .collect();
    if !missing.is_empty() {
        warn!(file, ?missing, "Declared columns absent, filling defaults");
    }

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while reader
        .read_record(&mut record)
        .map_err(|e| MalformedFeedError::row(file, &e))?
    {
        // Short rows are padded so trailing cells default like absent ones.
        while record.len() < headers.len() {
            record.push_field("");
        }
        let row: R = record
            .deserialize(Some(&headers))
            .map_err(|e| MalformedFeedError::row(file, &e))?;
        rows.push(row);
    }

    info!(table = table.name(), rows = rows.len(), "Table normalized");
    Ok(rows)
}

fn read_feed_info<S: Read + Seek>(archive: &mut ZipArchive<S>) -> Option<FeedInfo> {
    let file = archive.by_name(FEED_INFO_FILE).ok()?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    match reader.deserialize::<FeedInfo>().next() {
        Some(Ok(info)) => {
            debug!(version = %info.feed_version, "Feed info found");
            Some(info)
        }
        Some(Err(e)) => {
            warn!(error = %e, "Unreadable feed_info.txt ignored");
            None
        }
        None => None,
    }
}
