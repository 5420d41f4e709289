use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{LATEST_FILE, LatestAlias, Publisher, check_tag};
use crate::error::PublishError;
use crate::package::{MANIFEST_FILE, Manifest};

/// Publishes into a local release tree:
///
/// ```text
/// releases/
/// ├── db-2024-05-01/
/// │   ├── gtfs.db.gz
/// │   └── manifest.json
/// ├── latest/
/// │   └── <fingerprint>/gtfs.db.gz
/// └── latest.json      # {"tag": ..., "artifact": ..., "manifest": {...}}
/// ```
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn release_dir(&self, tag: &str) -> PathBuf {
        self.root.join(tag)
    }

    /// The current alias record, if any.
    pub async fn latest_alias(&self) -> Result<Option<LatestAlias>, PublishError> {
        let path = self.root.join(LATEST_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PublishError::io(path, e)),
        }
    }

    /// Path of the artifact copy "latest" resolves to.
    pub async fn latest_artifact(&self) -> Result<Option<PathBuf>, PublishError> {
        Ok(self
            .latest_alias()
            .await?
            .map(|alias| self.root.join(alias.artifact)))
    }
}

/// Writes beside the target and renames over it, so readers never observe
/// a half-written file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PublishError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PublishError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| PublishError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| PublishError::io(path, e))
}

async fn read(path: &Path) -> Result<Vec<u8>, PublishError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| PublishError::io(path, e))
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    #[tracing::instrument(skip(self, artifact, manifest), fields(root = %self.root.display()))]
    async fn publish(
        &self,
        artifact: &[u8],
        manifest: &Manifest,
        tag: &str,
    ) -> Result<(), PublishError> {
        let dir = self.release_dir(tag);
        write_atomic(&dir.join(&manifest.artifact), artifact).await?;
        write_atomic(&dir.join(MANIFEST_FILE), &manifest.to_json()?).await?;

        info!(dir = %dir.display(), bytes = artifact.len(), "Release written");
        Ok(())
    }

    #[tracing::instrument(skip(self, manifest), fields(root = %self.root.display()))]
    async fn update_latest(&self, tag: &str, manifest: &Manifest) -> Result<(), PublishError> {
        let dir = self.release_dir(tag);
        let stored = Manifest::from_json(&read(&dir.join(MANIFEST_FILE)).await?)?;
        check_tag(tag, manifest, &stored)?;

        let alias = LatestAlias::new(tag, manifest);
        let pinned = self.root.join(&alias.artifact);
        if !pinned.exists() {
            let artifact = read(&dir.join(&manifest.artifact)).await?;
            write_atomic(&pinned, &artifact).await?;
        }

        let previous = self.latest_alias().await?;
        write_atomic(&self.root.join(LATEST_FILE), &serde_json::to_vec_pretty(&alias)?).await?;
        info!(tag, fingerprint = %manifest.fingerprint, "Latest alias updated");

        if let Some(previous) = previous.filter(|p| p.artifact != alias.artifact) {
            let stale = self.root.join(&previous.artifact);
            if let Some(stale_dir) = stale.parent() {
                if let Err(e) = tokio::fs::remove_dir_all(stale_dir).await {
                    debug!(path = %stale_dir.display(), error = %e, "Previous artifact copy left in place");
                }
            }
        }
        Ok(())
    }

    async fn latest_manifest(&self) -> Result<Option<Manifest>, PublishError> {
        let alias = self.latest_alias().await?;
        if alias.is_none() {
            debug!(root = %self.root.display(), "No latest alias yet");
        }
        Ok(alias.map(|a| a.manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn manifest(fingerprint: &str, day: u32) -> Manifest {
        Manifest {
            schema_version: 1,
            version: format!("202405{day:02}0300"),
            fingerprint: Fingerprint::from(fingerprint.to_string()),
            fingerprint_algorithm: "sha256".into(),
            size_uncompressed: 8,
            size_compressed: 4,
            built_at: Utc.with_ymd_and_hms(2024, 5, day, 3, 0, 0).unwrap(),
            entity_counts: BTreeMap::new(),
            artifact: "gtfs.db.gz".into(),
            source: None,
            feed_version: None,
            feed_publisher: None,
        }
    }

    #[tokio::test]
    async fn test_no_alias_before_first_publish() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(dir.path());
        assert!(publisher.latest_manifest().await.unwrap().is_none());
        assert!(publisher.latest_artifact().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_then_alias() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(dir.path());
        let m = manifest("aa", 1);
        let tag = m.release_tag();

        publisher.publish(b"db", &m, &tag).await.unwrap();
        // Published but not aliased yet.
        assert!(publisher.latest_manifest().await.unwrap().is_none());

        publisher.update_latest(&tag, &m).await.unwrap();
        publisher.update_latest(&tag, &m).await.unwrap();

        assert_eq!(publisher.latest_manifest().await.unwrap(), Some(m));
        let artifact = std::fs::read(dir.path().join("db-2024-05-01/gtfs.db.gz")).unwrap();
        assert_eq!(artifact, b"db");
        let latest = publisher.latest_artifact().await.unwrap().unwrap();
        assert_eq!(std::fs::read(latest).unwrap(), b"db");
        assert!(!dir.path().join("latest.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_alias_moves_and_old_release_stays() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(dir.path());
        let (m1, m2) = (manifest("aa", 1), manifest("bb", 2));

        for m in [&m1, &m2] {
            let tag = m.release_tag();
            publisher.publish(b"db", m, &tag).await.unwrap();
            publisher.update_latest(&tag, m).await.unwrap();
        }

        let latest = publisher.latest_manifest().await.unwrap().unwrap();
        assert_eq!(latest.fingerprint, m2.fingerprint);
        assert!(publisher.release_dir("db-2024-05-01").join(MANIFEST_FILE).exists());
        assert!(!dir.path().join("latest/aa").exists());
    }

    #[tokio::test]
    async fn test_same_day_republish_does_not_move_alias() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(dir.path());
        let m1 = manifest("aa", 1);
        let mut m2 = manifest("bb", 1);
        m2.version = "202405011500".into();
        let tag = m1.release_tag();
        assert_eq!(tag, m2.release_tag());

        publisher.publish(b"first", &m1, &tag).await.unwrap();
        publisher.update_latest(&tag, &m1).await.unwrap();

        // Second build of the day overwrites the tag but never gets aliased.
        publisher.publish(b"second", &m2, &tag).await.unwrap();

        assert_eq!(publisher.latest_manifest().await.unwrap(), Some(m1.clone()));
        let latest = publisher.latest_artifact().await.unwrap().unwrap();
        assert_eq!(std::fs::read(latest).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_failed_alias_update_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(dir.path());
        let m1 = manifest("aa", 1);
        let m2 = manifest("bb", 1);
        let tag = m1.release_tag();

        publisher.publish(b"first", &m1, &tag).await.unwrap();
        publisher.update_latest(&tag, &m1).await.unwrap();
        publisher.publish(b"second", &m2, &tag).await.unwrap();

        // The tag now holds m2, so aliasing it as m1 must be refused.
        let err = publisher.update_latest(&tag, &m1).await.unwrap_err();
        assert!(matches!(err, PublishError::TagMismatch { .. }), "{err}");

        // Blocking the artifact copy makes the alias update itself fail.
        std::fs::write(dir.path().join("latest/bb"), b"not a directory").unwrap();
        assert!(publisher.update_latest(&tag, &m2).await.is_err());

        assert_eq!(publisher.latest_manifest().await.unwrap(), Some(m1));
        let latest = publisher.latest_artifact().await.unwrap().unwrap();
        assert_eq!(std::fs::read(latest).unwrap(), b"first");
    }
}
