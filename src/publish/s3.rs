use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{info, warn};

use super::{LATEST_FILE, LatestAlias, Publisher, check_tag};
use crate::error::PublishError;
use crate::package::{MANIFEST_FILE, Manifest};

/// Publishes to `s3://<bucket>/<prefix>/<tag>/`.
///
/// The alias is the single object `<prefix>/latest.json`; its artifact is a
/// server-side copy under `<prefix>/latest/<fingerprint>/`, made before the
/// alias object is replaced.
pub struct S3Publisher {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Publisher {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub async fn from_env(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), bucket, prefix)
    }

    fn key(&self, path: &str) -> String {
        object_key(&self.prefix, path)
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), PublishError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| PublishError::S3(e.into_service_error().to_string()))?;
        info!(bucket = %self.bucket, key, "Object uploaded");
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), PublishError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, from))
            .key(to)
            .send()
            .await
            .map_err(|e| PublishError::S3(e.into_service_error().to_string()))?;
        Ok(())
    }

    /// Body of `key`, or `None` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| PublishError::S3(e.to_string()))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(PublishError::S3(service_err.to_string()))
                }
            }
        }
    }

    async fn latest_alias(&self) -> Result<Option<LatestAlias>, PublishError> {
        match self.get(&self.key(LATEST_FILE)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn object_key(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{prefix}/{path}")
    }
}

#[async_trait]
impl Publisher for S3Publisher {
    #[tracing::instrument(skip(self, artifact, manifest), fields(bucket = %self.bucket))]
    async fn publish(
        &self,
        artifact: &[u8],
        manifest: &Manifest,
        tag: &str,
    ) -> Result<(), PublishError> {
        self.put(
            &self.key(&format!("{tag}/{}", manifest.artifact)),
            artifact.to_vec(),
            "application/gzip",
        )
        .await?;
        self.put(
            &self.key(&format!("{tag}/{MANIFEST_FILE}")),
            manifest.to_json()?,
            "application/json",
        )
        .await
    }

    #[tracing::instrument(skip(self, manifest), fields(bucket = %self.bucket))]
    async fn update_latest(&self, tag: &str, manifest: &Manifest) -> Result<(), PublishError> {
        let stored_key = self.key(&format!("{tag}/{MANIFEST_FILE}"));
        let stored = self
            .get(&stored_key)
            .await?
            .ok_or_else(|| PublishError::S3(format!("{stored_key} does not exist")))?;
        check_tag(tag, manifest, &Manifest::from_json(&stored)?)?;

        let alias = LatestAlias::new(tag, manifest);
        self.copy(
            &self.key(&format!("{tag}/{}", manifest.artifact)),
            &self.key(&alias.artifact),
        )
        .await?;

        let previous = self.latest_alias().await?;
        self.put(
            &self.key(LATEST_FILE),
            serde_json::to_vec_pretty(&alias)?,
            "application/json",
        )
        .await?;
        info!(tag, fingerprint = %manifest.fingerprint, "Latest alias updated");

        if let Some(previous) = previous.filter(|p| p.artifact != alias.artifact) {
            let stale = self.key(&previous.artifact);
            let deleted = self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&stale)
                .send()
                .await;
            if let Err(e) = deleted {
                warn!(key = %stale, error = %e.into_service_error(), "Previous artifact copy left in place");
            }
        }
        Ok(())
    }

    async fn latest_manifest(&self) -> Result<Option<Manifest>, PublishError> {
        let alias = self.latest_alias().await?;
        if alias.is_none() {
            info!(bucket = %self.bucket, "No latest alias yet");
        }
        Ok(alias.map(|a| a.manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_object_keys() {
        assert_eq!(
            object_key("gtfs", "db-2024-05-01/gtfs.db.gz"),
            "gtfs/db-2024-05-01/gtfs.db.gz"
        );
        assert_eq!(object_key("/gtfs/", LATEST_FILE), "gtfs/latest.json");
        assert_eq!(object_key("", LATEST_FILE), "latest.json");
    }

    #[test]
    fn test_alias_artifact_is_keyed_by_fingerprint() {
        let manifest = Manifest {
            schema_version: 1,
            version: "202405010300".into(),
            fingerprint: Fingerprint::from("ab".repeat(32)),
            fingerprint_algorithm: "sha256".into(),
            size_uncompressed: 8,
            size_compressed: 4,
            built_at: Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap(),
            entity_counts: Default::default(),
            artifact: "gtfs.db.gz".into(),
            source: None,
            feed_version: None,
            feed_publisher: None,
        };
        let alias = LatestAlias::new("db-2024-05-01", &manifest);
        assert_eq!(
            object_key("gtfs", &alias.artifact),
            format!("gtfs/latest/{}/gtfs.db.gz", "ab".repeat(32))
        );

        let json = serde_json::to_vec(&alias).unwrap();
        let back: LatestAlias = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, alias);
    }
}
