//! Feed acquisition: turns a feed location into raw archive bytes.
//!
//! No retries and no caching. A failed fetch is reported as-is and left to
//! whatever scheduled the run.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use crate::error::FetchError;

/// Content types a feed host may legitimately serve an archive with.
pub const ARCHIVE_CONTENT_TYPES: [&str; 4] = [
    "application/zip",
    "application/x-zip-compressed",
    "application/octet-stream",
    "binary/octet-stream",
];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Source of raw feed bytes.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Bytes, FetchError>;
}

/// Downloads the feed with a GET request.
pub struct HttpFeedSource<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> HttpFeedSource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl HttpFeedSource<BasicClient> {
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = BasicClient::new(timeout).map_err(|source| FetchError::Network {
            url: String::new(),
            source,
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl<C: HttpClient> FeedSource for HttpFeedSource<C> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let parsed = url
            .parse()
            .map_err(|_| FetchError::InvalidLocation(url.to_string()))?;
        let req = reqwest::Request::new(reqwest::Method::GET, parsed);

        let network = |source| FetchError::Network {
            url: url.to_string(),
            source,
        };
        let resp = self.client.execute(req).await.map_err(network)?;

        check_status(url, resp.status())?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        check_content_type(url, content_type.as_deref())?;

        let bytes = resp.bytes().await.map_err(network)?;
        info!(bytes = bytes.len(), "Feed downloaded");
        Ok(bytes)
    }
}

fn check_status(url: &str, status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// A missing header is accepted; a present one must name an archive type.
/// Parameters such as `; charset=...` are ignored.
pub fn check_content_type(url: &str, content_type: Option<&str>) -> Result<(), FetchError> {
    let Some(raw) = content_type else {
        debug!(url, "No content type served");
        return Ok(());
    };
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if ARCHIVE_CONTENT_TYPES.contains(&essence.as_str()) {
        Ok(())
    } else {
        Err(FetchError::ContentType {
            url: url.to_string(),
            content_type: raw.to_string(),
        })
    }
}

/// Reads an archive already on disk, for manual and test runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFeedSource;

#[async_trait]
impl FeedSource for FileFeedSource {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, location: &str) -> Result<Bytes, FetchError> {
        let path = PathBuf::from(location);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;
        info!(bytes = bytes.len(), "Feed read from disk");
        Ok(Bytes::from(bytes))
    }
}

/// Dispatches on the location: `http...` goes over the network, anything
/// else is read as a local path.
pub struct LocationSource<C: HttpClient> {
    http: HttpFeedSource<C>,
    file: FileFeedSource,
}

impl<C: HttpClient> LocationSource<C> {
    pub fn new(http: HttpFeedSource<C>) -> Self {
        Self {
            http,
            file: FileFeedSource,
        }
    }
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http")
}

#[async_trait]
impl<C: HttpClient> FeedSource for LocationSource<C> {
    async fn fetch(&self, location: &str) -> Result<Bytes, FetchError> {
        if location.trim().is_empty() {
            return Err(FetchError::InvalidLocation(location.to_string()));
        }
        if is_remote(location) {
            self.http.fetch(location).await
        } else {
            debug!(path = %Path::new(location).display(), "Treating location as a local file");
            self.file.fetch(location).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and sends every request to a closed local port.
    #[derive(Default)]
    struct ClosedPortClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HttpClient for ClosedPortClient {
        async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let client = reqwest::Client::new();
            let url = format!("http://127.0.0.1:9{}", req.url().path());
            client.get(url).send().await
        }
    }

    /// Answers every request with a fixed response.
    struct StubClient {
        status: u16,
        content_type: Option<&'static str>,
        body: &'static [u8],
    }

    #[async_trait]
    impl HttpClient for StubClient {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            let mut builder = http::Response::builder().status(self.status);
            if let Some(ct) = self.content_type {
                builder = builder.header(CONTENT_TYPE, ct);
            }
            Ok(builder.body(self.body.to_vec()).unwrap().into())
        }
    }

    fn stub(
        status: u16,
        content_type: Option<&'static str>,
        body: &'static [u8],
    ) -> HttpFeedSource<StubClient> {
        HttpFeedSource::new(StubClient {
            status,
            content_type,
            body,
        })
    }

    #[tokio::test]
    async fn test_zip_response_returns_body() {
        let source = stub(200, Some("application/zip"), b"PK\x03\x04zip");
        let bytes = source.fetch("https://feeds.example/gtfs.zip").await.unwrap();
        assert_eq!(&bytes[..], b"PK\x03\x04zip");

        let untyped = stub(200, None, b"PK");
        assert_eq!(&untyped.fetch("https://feeds.example/gtfs.zip").await.unwrap()[..], b"PK");
    }

    #[tokio::test]
    async fn test_html_response_is_content_type_error() {
        let source = stub(200, Some("text/html; charset=utf-8"), b"<html>maintenance</html>");
        let err = source.fetch("https://feeds.example/gtfs.zip").await.unwrap_err();
        match err {
            FetchError::ContentType { url, content_type } => {
                assert_eq!(url, "https://feeds.example/gtfs.zip");
                assert_eq!(content_type, "text/html; charset=utf-8");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_response_is_status_error() {
        let source = stub(404, Some("application/zip"), b"");
        let err = source.fetch("https://feeds.example/gtfs.zip").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }), "{err}");
    }

    #[test]
    fn test_archive_content_types_accepted() {
        for ct in ARCHIVE_CONTENT_TYPES {
            assert!(check_content_type("u", Some(ct)).is_ok(), "{ct}");
        }
        assert!(check_content_type("u", Some("Application/Zip; charset=binary")).is_ok());
        assert!(check_content_type("u", None).is_ok());
    }

    #[test]
    fn test_html_content_type_rejected() {
        let err = check_content_type("http://feed", Some("text/html; charset=utf-8")).unwrap_err();
        match err {
            FetchError::ContentType { url, content_type } => {
                assert_eq!(url, "http://feed");
                assert_eq!(content_type, "text/html; charset=utf-8");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_success_status_rejected() {
        assert!(check_status("u", StatusCode::OK).is_ok());
        assert!(matches!(
            check_status("u", StatusCode::NOT_FOUND),
            Err(FetchError::Status { status: 404, .. })
        ));
        assert!(matches!(
            check_status("u", StatusCode::SERVICE_UNAVAILABLE),
            Err(FetchError::Status { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_unparsable_url_never_hits_the_client() {
        let source = HttpFeedSource::new(ClosedPortClient::default());
        let err = source.fetch("http://").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidLocation(_)));
        assert_eq!(source.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let source = HttpFeedSource::new(ClosedPortClient::default());
        let err = source.fetch("http://feeds.invalid/gtfs.zip").await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "{err}");
        assert_eq!(source.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_file_source_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gtfs.zip");
        std::fs::write(&path, b"PK\x03\x04").unwrap();

        let source = LocationSource::new(HttpFeedSource::new(ClosedPortClient::default()));
        let bytes = source.fetch(path.to_str().unwrap()).await.unwrap();
        assert_eq!(&bytes[..], b"PK\x03\x04");
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let err = FileFeedSource
            .fetch("/nonexistent/gtfs.zip")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }

    #[tokio::test]
    async fn test_empty_location_rejected() {
        let source = LocationSource::new(HttpFeedSource::new(ClosedPortClient::default()));
        assert!(matches!(
            source.fetch("  ").await,
            Err(FetchError::InvalidLocation(_))
        ));
    }

    #[test]
    fn test_remote_dispatch() {
        assert!(is_remote("https://romamobilita.it/feed.zip"));
        assert!(!is_remote("./gtfs.zip"));
    }
}
