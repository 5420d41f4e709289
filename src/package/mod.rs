//! Turns a gated store into a compressed database artifact plus manifest.
//!
//! Output layout under the packager's directory:
//!
//! ```text
//! output/
//! ├── gtfs.db          # SQLite database (uncompressed)
//! ├── gtfs.db.gz       # artifact handed to the publisher
//! └── manifest.json
//! ```

mod manifest;
pub mod sqlite;

pub use manifest::{MANIFEST_FILE, Manifest};

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use crate::error::PackagingError;
use crate::fingerprint::{self, ALGORITHM, CANONICAL_VERSION, Fingerprint};
use crate::normalize::FeedInfo;
use crate::store::RelationalStore;

/// Facts about a build that do not come from the store itself.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub built_at: DateTime<Utc>,
    pub source: Option<String>,
    pub feed_info: Option<FeedInfo>,
}

impl BuildContext {
    pub fn now(source: Option<String>, feed_info: Option<FeedInfo>) -> Self {
        Self {
            built_at: Utc::now(),
            source,
            feed_info,
        }
    }
}

/// Result of a successful packaging step.
#[derive(Debug, Clone)]
pub struct Package {
    pub database_path: PathBuf,
    pub artifact_path: PathBuf,
    pub manifest_path: PathBuf,
    /// Compressed database bytes.
    pub artifact: Vec<u8>,
    pub manifest: Manifest,
}

pub struct Packager {
    output_dir: PathBuf,
    db_name: String,
}

impl Packager {
    pub fn new(output_dir: impl Into<PathBuf>, db_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            db_name: db_name.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes the database, compresses it and writes the manifest.
    ///
    /// `fingerprint` must be the fingerprint of `store`; it is copied into
    /// the manifest verbatim.
    #[tracing::instrument(skip_all, fields(output_dir = %self.output_dir.display()))]
    pub fn package(
        &self,
        store: &RelationalStore,
        fingerprint: &Fingerprint,
        context: &BuildContext,
    ) -> Result<Package, PackagingError> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| PackagingError::io(&self.output_dir, e))?;

        let database_path = self.output_dir.join(&self.db_name);
        if database_path.exists() {
            fs::remove_file(&database_path).map_err(|e| PackagingError::io(&database_path, e))?;
            debug!(path = %database_path.display(), "Removed previous database");
        }
        sqlite::write_store(&database_path, store)?;

        let database =
            fs::read(&database_path).map_err(|e| PackagingError::io(&database_path, e))?;
        let artifact = compress(&database).map_err(|e| PackagingError::io(&database_path, e))?;

        let artifact_name = format!("{}.gz", self.db_name);
        let artifact_path = self.output_dir.join(&artifact_name);
        fs::write(&artifact_path, &artifact).map_err(|e| PackagingError::io(&artifact_path, e))?;

        let feed_info = context.feed_info.as_ref();
        let manifest = Manifest {
            schema_version: CANONICAL_VERSION,
            version: context.built_at.format("%Y%m%d%H%M").to_string(),
            fingerprint: fingerprint.clone(),
            fingerprint_algorithm: ALGORITHM.to_string(),
            size_uncompressed: database.len() as u64,
            size_compressed: artifact.len() as u64,
            built_at: context.built_at,
            entity_counts: store.entity_counts(),
            artifact: artifact_name,
            source: context.source.clone(),
            feed_version: feed_info
                .map(|i| i.feed_version.clone())
                .filter(|v| !v.is_empty()),
            feed_publisher: feed_info
                .map(|i| i.feed_publisher_name.clone())
                .filter(|v| !v.is_empty()),
        };
        let manifest_path = self.output_dir.join(MANIFEST_FILE);
        manifest.write(&manifest_path)?;

        info!(
            fingerprint = %manifest.fingerprint,
            size_uncompressed = manifest.size_uncompressed,
            size_compressed = manifest.size_compressed,
            "Snapshot packaged"
        );

        Ok(Package {
            database_path,
            artifact_path,
            manifest_path,
            artifact,
            manifest,
        })
    }
}

/// Gzip with a fixed header, so equal input gives equal output.
pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Outcome of re-deriving a manifest's fingerprint from its artifact.
#[derive(Debug, Clone)]
pub struct Verification {
    pub expected: Fingerprint,
    pub actual: Fingerprint,
    pub counts_match: bool,
}

/// First disagreement found between a manifest and its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    Fingerprint,
    EntityCounts,
}

impl Verification {
    pub fn is_consistent(&self) -> bool {
        self.problem().is_none()
    }

    pub fn problem(&self) -> Option<Mismatch> {
        if self.expected != self.actual {
            Some(Mismatch::Fingerprint)
        } else if !self.counts_match {
            Some(Mismatch::EntityCounts)
        } else {
            None
        }
    }
}

/// Decompresses the artifact named by the manifest at `manifest_path`,
/// reloads its tables and fingerprints them independently.
pub fn verify(manifest_path: &Path) -> Result<Verification, PackagingError> {
    let manifest = Manifest::read(manifest_path)?;
    let dir = manifest_path.parent().unwrap_or(Path::new("."));
    let artifact_path = dir.join(&manifest.artifact);

    let artifact = fs::read(&artifact_path).map_err(|e| PackagingError::io(&artifact_path, e))?;
    let database = decompress(&artifact).map_err(|e| PackagingError::io(&artifact_path, e))?;

    // Removed when dropped.
    let mut scratch = tempfile::Builder::new()
        .prefix("gtfs_snapshot_verify")
        .suffix(".db")
        .tempfile()
        .map_err(|e| PackagingError::io(std::env::temp_dir(), e))?;
    scratch
        .write_all(&database)
        .and_then(|()| scratch.flush())
        .map_err(|e| PackagingError::io(scratch.path(), e))?;
    let tables = sqlite::read_tables(scratch.path())?;

    let actual = fingerprint::fingerprint_tables(&tables).map_err(|e| {
        PackagingError::Integrity(format!("artifact could not be fingerprinted: {e}"))
    })?;

    Ok(Verification {
        expected: manifest.fingerprint,
        actual,
        counts_match: tables.entity_counts() == manifest.entity_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Route, Shape, Stop, StopTime, Trip};
    use crate::store::Tables;
    use chrono::{NaiveDate, TimeZone};

    fn store() -> RelationalStore {
        let tables = Tables {
            routes: vec![Route {
                route_id: "A".into(),
                route_short_name: "A".into(),
                route_type: 1,
                ..Default::default()
            }],
            trips: vec![Trip {
                trip_id: "T1".into(),
                route_id: "A".into(),
                service_id: "WK".into(),
                ..Default::default()
            }],
            stops: vec![Stop {
                stop_id: "1".into(),
                stop_name: "Termini".into(),
                stop_lat: 41.901,
                stop_lon: 12.501,
                ..Default::default()
            }],
            stop_times: vec![StopTime {
                trip_id: "T1".into(),
                stop_id: "1".into(),
                stop_sequence: 1,
                shape_dist_traveled: Some(0.25),
                ..Default::default()
            }],
            calendar_dates: vec![crate::schema::CalendarDate {
                service_id: "WK".into(),
                date: NaiveDate::from_ymd_opt(2024, 12, 25),
                exception_type: 2,
            }],
            shapes: vec![Shape {
                shape_id: "S1".into(),
                shape_pt_lat: 41.9,
                shape_pt_lon: 12.5,
                shape_pt_sequence: 1,
                shape_dist_traveled: None,
            }],
            ..Default::default()
        };
        RelationalStore::build(tables).unwrap()
    }

    fn context() -> BuildContext {
        BuildContext {
            built_at: Utc.with_ymd_and_hms(2024, 5, 1, 3, 15, 0).unwrap(),
            source: Some("feed.zip".into()),
            feed_info: Some(FeedInfo {
                feed_publisher_name: "Roma Mobilita".into(),
                feed_version: String::new(),
            }),
        }
    }

    fn packaged(dir: &Path) -> (RelationalStore, Fingerprint, Package) {
        let store = store();
        let fp = fingerprint::fingerprint(&store).unwrap();
        let package = Packager::new(dir, "gtfs.db")
            .package(&store, &fp, &context())
            .unwrap();
        (store, fp, package)
    }

    #[test]
    fn test_manifest_describes_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let (store, fp, package) = packaged(dir.path());
        let manifest = &package.manifest;

        assert_eq!(manifest.fingerprint, fp);
        assert_eq!(manifest.entity_counts, store.entity_counts());
        assert_eq!(manifest.version, "202405010315");
        assert_eq!(manifest.artifact, "gtfs.db.gz");
        assert_eq!(manifest.feed_publisher.as_deref(), Some("Roma Mobilita"));
        assert_eq!(manifest.feed_version, None);
        assert_eq!(
            manifest.size_uncompressed,
            fs::metadata(&package.database_path).unwrap().len()
        );
        assert_eq!(
            manifest.size_compressed,
            fs::metadata(&package.artifact_path).unwrap().len()
        );
        assert_eq!(Manifest::read(&package.manifest_path).unwrap(), *manifest);
    }

    #[test]
    fn test_compression_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, package) = packaged(dir.path());

        let database = fs::read(&package.database_path).unwrap();
        assert_eq!(decompress(&package.artifact).unwrap(), database);
    }

    #[test]
    fn test_packaged_store_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let (store, fp, package) = packaged(dir.path());

        let tables = sqlite::read_tables(&package.database_path).unwrap();
        assert_eq!(&tables, store.tables());
        assert_eq!(fingerprint::fingerprint_tables(&tables).unwrap(), fp);
    }

    #[test]
    fn test_verify_recomputes_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, package) = packaged(dir.path());

        let verification = verify(&package.manifest_path).unwrap();
        assert!(verification.is_consistent());
    }

    #[test]
    fn test_concurrent_verifies_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, package) = packaged(dir.path());

        let path = package.manifest_path.clone();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || verify(&path).unwrap().is_consistent())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_verify_detects_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, package) = packaged(dir.path());

        let mut manifest = package.manifest.clone();
        manifest.entity_counts.insert("stops".into(), 99);
        manifest.write(&package.manifest_path).unwrap();

        let verification = verify(&package.manifest_path).unwrap();
        assert_eq!(verification.expected, verification.actual);
        assert!(!verification.counts_match);
        assert_eq!(verification.problem(), Some(Mismatch::EntityCounts));
    }

    #[test]
    fn test_verify_detects_tampered_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, package) = packaged(dir.path());

        let mut manifest = package.manifest.clone();
        manifest.fingerprint = Fingerprint::from("00".repeat(32));
        manifest.write(&package.manifest_path).unwrap();

        let verification = verify(&package.manifest_path).unwrap();
        assert!(!verification.is_consistent());
        assert_eq!(verification.problem(), Some(Mismatch::Fingerprint));
    }

    #[test]
    fn test_database_carries_declared_indices() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, package) = packaged(dir.path());

        let names = sqlite::list_indices(&package.database_path).unwrap();
        let mut expected: Vec<_> = crate::index::INDEX_SPECS
            .iter()
            .map(|s| s.name.to_string())
            .collect();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_repackaging_replaces_previous_database() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, first) = packaged(dir.path());
        let (_, _, second) = packaged(dir.path());
        assert_eq!(first.manifest.fingerprint, second.manifest.fingerprint);
        assert_eq!(
            first.manifest.entity_counts,
            second.manifest.entity_counts
        );
    }
}
