//! Where finished snapshots go.
//!
//! A publisher stores each artifact under its dated tag and keeps a single
//! "latest" alias. The alias is the only state shared between runs: the
//! change gate reads the fingerprint it resolves to, and only a successful
//! [`Publisher::update_latest`] moves it.
//!
//! Tags are per day, so a later build on the same day overwrites its tag.
//! The alias therefore never points into a tag directly. It is one record,
//! replaced in a single write, holding a copy of the manifest and the
//! location of an artifact copy keyed by fingerprint.

mod directory;
mod s3;

pub use directory::DirectoryPublisher;
pub use s3::S3Publisher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PublishError;
use crate::package::Manifest;

/// File name of the alias record.
pub const LATEST_FILE: &str = "latest.json";

/// Directory (or key prefix) holding the fingerprint-keyed artifact copies.
const LATEST_DIR: &str = "latest";

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Stores `artifact` and `manifest` under `tag`. Re-publishing a tag
    /// replaces it.
    async fn publish(
        &self,
        artifact: &[u8],
        manifest: &Manifest,
        tag: &str,
    ) -> Result<(), PublishError>;

    /// Points the "latest" alias at the release `manifest` describes under
    /// `tag`. Repeating the call is harmless.
    async fn update_latest(&self, tag: &str, manifest: &Manifest) -> Result<(), PublishError>;

    /// Manifest the "latest" alias resolves to, `None` before the first
    /// publish.
    async fn latest_manifest(&self) -> Result<Option<Manifest>, PublishError>;
}

/// Contents of the alias record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestAlias {
    pub tag: String,
    /// Artifact copy location, relative to the publisher root.
    pub artifact: String,
    pub manifest: Manifest,
}

impl LatestAlias {
    pub fn new(tag: &str, manifest: &Manifest) -> Self {
        Self {
            tag: tag.to_string(),
            artifact: format!(
                "{LATEST_DIR}/{}/{}",
                manifest.fingerprint, manifest.artifact
            ),
            manifest: manifest.clone(),
        }
    }
}

/// Refuses to alias a tag whose stored manifest is not the one expected.
fn check_tag(tag: &str, expected: &Manifest, stored: &Manifest) -> Result<(), PublishError> {
    if stored.fingerprint == expected.fingerprint {
        Ok(())
    } else {
        Err(PublishError::TagMismatch {
            tag: tag.to_string(),
            expected: expected.fingerprint.to_string(),
            found: stored.fingerprint.to_string(),
        })
    }
}
