use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PackagingError;
use crate::fingerprint::Fingerprint;

/// File name of the manifest written beside each artifact.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Description of one build, published beside its artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Canonical serialization version the fingerprint was computed with.
    pub schema_version: u32,
    /// Build time as `YYYYMMDDHHMM`.
    pub version: String,
    pub fingerprint: Fingerprint,
    pub fingerprint_algorithm: String,
    pub size_uncompressed: u64,
    pub size_compressed: u64,
    pub built_at: DateTime<Utc>,
    pub entity_counts: BTreeMap<String, u64>,
    /// File name of the compressed database.
    pub artifact: String,
    pub source: Option<String>,
    pub feed_version: Option<String>,
    pub feed_publisher: Option<String>,
}

impl Manifest {
    /// Dated release tag, e.g. `db-2024-05-01`.
    pub fn release_tag(&self) -> String {
        format!("db-{}", self.built_at.format("%Y-%m-%d"))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn write(&self, path: &Path) -> Result<(), PackagingError> {
        fs::write(path, self.to_json()?).map_err(|e| PackagingError::io(path, e))
    }

    pub fn read(path: &Path) -> Result<Self, PackagingError> {
        let bytes = fs::read(path).map_err(|e| PackagingError::io(path, e))?;
        Ok(Self::from_json(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn manifest() -> Manifest {
        Manifest {
            schema_version: 1,
            version: "202405010300".into(),
            fingerprint: Fingerprint::from("ab".repeat(32)),
            fingerprint_algorithm: "sha256".into(),
            size_uncompressed: 4096,
            size_compressed: 1024,
            built_at: Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap(),
            entity_counts: BTreeMap::from([("stops".to_string(), 1)]),
            artifact: "gtfs.db.gz".into(),
            source: None,
            feed_version: None,
            feed_publisher: None,
        }
    }

    #[test]
    fn test_release_tag_uses_build_date() {
        assert_eq!(manifest().release_tag(), "db-2024-05-01");
    }

    #[test]
    fn test_json_keeps_required_fields() {
        let json: serde_json::Value = serde_json::from_slice(&manifest().to_json().unwrap()).unwrap();
        assert_eq!(json["fingerprint"], "ab".repeat(32));
        assert_eq!(json["entity_counts"]["stops"], 1);
        assert_eq!(json["size_compressed"], 1024);
        assert_eq!(json["built_at"], "2024-05-01T03:00:00Z");
        assert!(json["feed_version"].is_null());

        let back = Manifest::from_json(&manifest().to_json().unwrap()).unwrap();
        assert_eq!(back, manifest());
    }
}
