//! Decides whether a new snapshot is worth publishing.

use std::fmt;

use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Publish,
    Suppress,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Publish => f.write_str("publish"),
            Decision::Suppress => f.write_str("suppress"),
        }
    }
}

/// Publish unless the previously published fingerprint equals `current`.
/// No previous fingerprint means this is the first publish.
pub fn decide(previous: Option<&Fingerprint>, current: &Fingerprint) -> Decision {
    match previous {
        Some(previous) if previous == current => Decision::Suppress,
        _ => Decision::Publish,
    }
}
