//! Run settings resolved from the environment.
//!
//! | variable                  | default                                     |
//! |---------------------------|---------------------------------------------|
//! | `GTFS_FEED_URL`           | [`DEFAULT_FEED_URL`]                        |
//! | `GTFS_OUTPUT_DIR`         | `output`                                    |
//! | `GTFS_DB_NAME`            | `gtfs.db`                                   |
//! | `GTFS_FETCH_TIMEOUT_SECS` | `180`                                       |
//! | `GTFS_PUBLISH_DIR`        | `releases`                                  |
//! | `GTFS_S3_BUCKET`          | unset, releases go to `GTFS_PUBLISH_DIR`    |
//! | `GTFS_S3_PREFIX`          | `gtfs`                                      |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::fetch::DEFAULT_TIMEOUT;

pub const DEFAULT_FEED_URL: &str = "https://romamobilita.it/sites/default/files/rome_static_gtfs.zip";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got '{value}'")]
    InvalidTimeout { var: &'static str, value: String },
}

/// Where releases are published.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishTarget {
    Directory(PathBuf),
    S3 { bucket: String, prefix: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub feed_url: String,
    pub output_dir: PathBuf,
    pub db_name: String,
    pub fetch_timeout: Duration,
    pub publish_dir: PathBuf,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            output_dir: PathBuf::from("output"),
            db_name: "gtfs.db".to_string(),
            fetch_timeout: DEFAULT_TIMEOUT,
            publish_dir: PathBuf::from("releases"),
            s3_bucket: None,
            s3_prefix: "gtfs".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolves settings through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(url) = get("GTFS_FEED_URL") {
            settings.feed_url = url;
        }
        if let Some(dir) = get("GTFS_OUTPUT_DIR") {
            settings.output_dir = dir.into();
        }
        if let Some(name) = get("GTFS_DB_NAME") {
            settings.db_name = name;
        }
        if let Some(secs) = get("GTFS_FETCH_TIMEOUT_SECS") {
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout {
                    var: "GTFS_FETCH_TIMEOUT_SECS",
                    value: secs.clone(),
                })?;
            settings.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = get("GTFS_PUBLISH_DIR") {
            settings.publish_dir = dir.into();
        }
        settings.s3_bucket = get("GTFS_S3_BUCKET");
        if let Some(prefix) = get("GTFS_S3_PREFIX") {
            settings.s3_prefix = prefix;
        }
        Ok(settings)
    }

    /// S3 when a bucket is configured, the local release directory otherwise.
    pub fn publish_target(&self) -> PublishTarget {
        match &self.s3_bucket {
            Some(bucket) => PublishTarget::S3 {
                bucket: bucket.clone(),
                prefix: self.s3_prefix.clone(),
            },
            None => PublishTarget::Directory(self.publish_dir.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.fetch_timeout, Duration::from_secs(180));
        assert_eq!(s.publish_target(), PublishTarget::Directory("releases".into()));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("GTFS_FEED_URL", "./gtfs.zip"),
            ("GTFS_DB_NAME", "rome.db"),
            ("GTFS_FETCH_TIMEOUT_SECS", " 30 "),
            ("GTFS_S3_BUCKET", "transit-releases"),
            ("GTFS_S3_PREFIX", ""),
        ])
        .unwrap();
        assert_eq!(s.feed_url, "./gtfs.zip");
        assert_eq!(s.db_name, "rome.db");
        assert_eq!(s.fetch_timeout, Duration::from_secs(30));
        assert_eq!(
            s.publish_target(),
            PublishTarget::S3 {
                bucket: "transit-releases".into(),
                prefix: "gtfs".into()
            }
        );
    }

    #[test]
    fn test_bad_timeout() {
        let err = settings(&[("GTFS_FETCH_TIMEOUT_SECS", "3m")]).unwrap_err();
        assert!(err.to_string().contains("3m"));
    }
}
