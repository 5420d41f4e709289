//! Error kinds for every pipeline stage.
//!
//! Each stage owns one error type. [`Error`] unifies them so a run can
//! report the originating kind unchanged.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::Table;

/// The feed could not be acquired.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid feed location '{0}'")]
    InvalidLocation(String),

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} served content type '{content_type}', expected a zip archive")]
    ContentType { url: String, content_type: String },

    #[error("failed to read feed file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The archive or one of its entity files does not fit the fixed schema.
#[derive(Error, Debug)]
pub enum MalformedFeedError {
    #[error("feed archive could not be opened: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("required file {0} is missing from the feed")]
    MissingFile(&'static str),

    #[error("{file} has no '{column}' column")]
    MissingKeyColumn {
        file: &'static str,
        column: &'static str,
    },

    #[error("{file} header could not be read: {source}")]
    Header {
        file: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{file} line {line}: {message}")]
    Row {
        file: &'static str,
        line: u64,
        message: String,
    },
}

impl MalformedFeedError {
    pub(crate) fn row(file: &'static str, err: &csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let message = match err.kind() {
            csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
            _ => err.to_string(),
        };
        Self::Row {
            file,
            line,
            message,
        }
    }
}

/// An index declaration references a column its table does not have.
#[derive(Error, Debug)]
pub enum IndexBuildError {
    #[error("index {index} references unknown column {table}.{column}")]
    UnknownColumn {
        index: &'static str,
        table: Table,
        column: &'static str,
    },
}

/// Canonicalization met a value outside its column's domain.
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("{table}.{column} row {row} holds a non-finite float")]
    NonFiniteFloat {
        table: Table,
        column: &'static str,
        row: usize,
    },

    #[error("{table}.{column} row {row} does not match its declared type")]
    KindMismatch {
        table: Table,
        column: &'static str,
        row: usize,
    },
}

/// Writing, compressing or reloading the database artifact failed.
#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("{table} row {row} does not match the declared schema")]
    SchemaMismatch { table: Table, row: usize },

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl PackagingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// The publisher rejected an artifact or alias update.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("S3 error: {0}")]
    S3(String),

    #[error("release {tag} holds fingerprint {found}, expected {expected}")]
    TagMismatch {
        tag: String,
        expected: String,
        found: String,
    },

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl PublishError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Any stage failure, carried unchanged to the run's terminal state.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    MalformedFeed(#[from] MalformedFeedError),

    #[error(transparent)]
    IndexBuild(#[from] IndexBuildError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl Error {
    /// Stable name of the error kind, used in logs and run records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Fetch(_) => "FetchError",
            Error::MalformedFeed(_) => "MalformedFeedError",
            Error::IndexBuild(_) => "IndexBuildError",
            Error::Fingerprint(_) => "FingerprintError",
            Error::Packaging(_) => "PackagingError",
            Error::Publish(_) => "PublishError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let err: Error = MalformedFeedError::MissingFile("stops.txt").into();
        assert_eq!(err.kind(), "MalformedFeedError");

        let err: Error = PackagingError::Integrity("bad page".into()).into();
        assert_eq!(err.kind(), "PackagingError");
    }

    #[test]
    fn test_messages_name_the_culprit() {
        let err = IndexBuildError::UnknownColumn {
            index: "idx_bad",
            table: Table::Trips,
            column: "nope",
        };
        assert_eq!(
            err.to_string(),
            "index idx_bad references unknown column trips.nope"
        );
    }
}
