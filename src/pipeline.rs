//! One build run: fetch, normalize, index, fingerprint, gate, package,
//! publish.
//!
//! Every stage fails fast. A failure anywhere ends the run with a
//! [`PipelineError`] naming the stage; nothing after the failing stage
//! runs, so the published "latest" alias only ever moves at the very end.

use std::fmt;

use thiserror::Error;
use tracing::{error, info};

use crate::error::Error;
use crate::fetch::FeedSource;
use crate::fingerprint::{self, Fingerprint};
use crate::gate::{self, Decision};
use crate::normalize;
use crate::package::{BuildContext, Manifest, Packager};
use crate::publish::Publisher;
use crate::store::RelationalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Normalizing,
    Indexing,
    Fingerprinting,
    Gating,
    Packaging,
    Publishing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Normalizing => "normalizing",
            Stage::Indexing => "indexing",
            Stage::Fingerprinting => "fingerprinting",
            Stage::Gating => "gating",
            Stage::Packaging => "packaging",
            Stage::Publishing => "publishing",
        };
        f.write_str(name)
    }
}

/// Terminal state of a run that did not fail.
#[derive(Debug, Clone)]
pub enum Outcome {
    Published { manifest: Manifest, tag: String },
    /// The store matches what "latest" already holds.
    Suppressed { fingerprint: Fingerprint },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Published { .. } => "published",
            Outcome::Suppressed { .. } => "suppressed",
        }
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Outcome::Published { manifest, .. } => &manifest.fingerprint,
            Outcome::Suppressed { fingerprint } => fingerprint,
        }
    }
}

/// A failed run: the stage it stopped in and the error that stopped it.
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

fn at<E: Into<Error>>(stage: Stage) -> impl FnOnce(E) -> PipelineError {
    move |e| PipelineError {
        stage,
        source: e.into(),
    }
}

pub struct Pipeline<S, P> {
    source: S,
    publisher: P,
    packager: Packager,
}

impl<S: FeedSource, P: Publisher> Pipeline<S, P> {
    pub fn new(source: S, publisher: P, packager: Packager) -> Self {
        Self {
            source,
            publisher,
            packager,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Runs every stage once against `location`.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, location: &str) -> Result<Outcome, PipelineError> {
        let result = self.execute(location).await;
        match &result {
            Ok(Outcome::Published { manifest, tag }) => info!(
                outcome = "published",
                tag = %tag,
                fingerprint = %manifest.fingerprint,
                "Snapshot published"
            ),
            Ok(Outcome::Suppressed { fingerprint }) => info!(
                outcome = "suppressed",
                fingerprint = %fingerprint,
                "Snapshot unchanged, publish suppressed"
            ),
            Err(e) => error!(
                outcome = "failed",
                stage = %e.stage,
                kind = e.source.kind(),
                error = %e.source,
                "Build failed"
            ),
        }
        result
    }

    async fn execute(&self, location: &str) -> Result<Outcome, PipelineError> {
        let bytes = self
            .source
            .fetch(location)
            .await
            .map_err(at(Stage::Fetching))?;

        let feed = normalize::normalize(&bytes).map_err(at(Stage::Normalizing))?;
        let store = RelationalStore::build(feed.tables).map_err(at(Stage::Indexing))?;
        let current = fingerprint::fingerprint(&store).map_err(at(Stage::Fingerprinting))?;

        let previous = self
            .publisher
            .latest_manifest()
            .await
            .map_err(at(Stage::Gating))?;
        let decision = gate::decide(previous.as_ref().map(|m| &m.fingerprint), &current);
        info!(%decision, fingerprint = %current, first_run = previous.is_none(), "Change gate");
        if decision == Decision::Suppress {
            return Ok(Outcome::Suppressed {
                fingerprint: current,
            });
        }

        let context = BuildContext::now(Some(location.to_string()), feed.feed_info);
        let package = self
            .packager
            .package(&store, &current, &context)
            .map_err(at(Stage::Packaging))?;

        let tag = package.manifest.release_tag();
        self.publisher
            .publish(&package.artifact, &package.manifest, &tag)
            .await
            .map_err(at(Stage::Publishing))?;
        self.publisher
            .update_latest(&tag, &package.manifest)
            .await
            .map_err(at(Stage::Publishing))?;

        Ok(Outcome::Published {
            manifest: package.manifest,
            tag,
        })
    }
}
