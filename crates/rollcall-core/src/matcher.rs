//! Probe classification against the enrolled roster.

use std::sync::Arc;

use crate::store::{Identity, IdentityStore, Roster};
use crate::types::Embedding;

/// Result of classifying one observed embedding.
#[derive(Debug, Clone)]
pub enum Match {
    Matched {
        identity: Arc<Identity>,
        distance: f32,
    },
    Unknown,
}

impl Match {
    pub fn is_matched(&self) -> bool {
        matches!(self, Match::Matched { .. })
    }
}

/// Strategy for selecting an enrolled identity for a probe embedding.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, roster: &Roster, threshold: f32) -> Match;
}

/// Enrollment-order matcher: returns the FIRST roster entry whose
/// Euclidean distance to the probe falls below the threshold.
///
/// This is deliberately not nearest-match. The deployed system accepted
/// the first candidate under tolerance in enrollment order, and downstream
/// attendance records depend on that selection; see DESIGN.md before
/// changing the policy.
pub struct FirstBelowThreshold;

impl Matcher for FirstBelowThreshold {
    fn compare(&self, probe: &Embedding, roster: &Roster, threshold: f32) -> Match {
        for identity in roster.iter() {
            let distance = probe.euclidean_distance(&identity.embedding);
            if distance < threshold {
                tracing::trace!(name = %identity.name, distance, "probe matched");
                return Match::Matched {
                    identity: Arc::clone(identity),
                    distance,
                };
            }
        }
        Match::Unknown
    }
}

/// Classifies observed embeddings against the store's current snapshot.
/// Never mutates the store.
pub struct MatchEngine {
    store: Arc<IdentityStore>,
    threshold: f32,
}

impl MatchEngine {
    /// Distance tolerance the deployed recognizer ran with.
    pub const DEFAULT_THRESHOLD: f32 = 0.6;

    pub fn new(store: Arc<IdentityStore>, threshold: f32) -> Self {
        Self { store, threshold }
    }

    /// Classify one probe. Empty roster always yields `Unknown`.
    pub fn classify(&self, probe: &Embedding) -> Match {
        FirstBelowThreshold.compare(probe, &self.store.snapshot(), self.threshold)
    }
}
