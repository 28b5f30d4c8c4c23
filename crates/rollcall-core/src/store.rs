//! Enrolled-identity set with snapshot-swap publication.
//!
//! Enrollment and matching run on different threads (interactive
//! registration vs. the recognition loop). Writers publish a fresh
//! immutable roster under a short-lived lock; readers clone the current
//! `Arc` and compare every probe in a pass against that one snapshot.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Embedding;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollError {
    #[error("name already enrolled: {0}")]
    DuplicateName(String),
    #[error("tag already enrolled: {0}")]
    DuplicateTag(u32),
}

/// An enrolled person: unique name, unique positive tag, reference
/// embedding. Immutable once enrolled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub tag: u32,
    pub embedding: Embedding,
}

/// Published roster snapshot. All identities compared against one probe
/// see the same list, in enrollment order.
pub type Roster = Arc<Vec<Arc<Identity>>>;

#[derive(Default)]
pub struct IdentityStore {
    roster: Mutex<Roster>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll a new identity. Rejects duplicate names and duplicate tags
    /// without modifying the roster.
    pub fn enroll(&self, name: &str, tag: u32, embedding: Embedding) -> Result<(), EnrollError> {
        let mut current = self.roster.lock().expect("identity roster lock poisoned");

        if let Some(existing) = current.iter().find(|i| i.name == name) {
            return Err(EnrollError::DuplicateName(existing.name.clone()));
        }
        if current.iter().any(|i| i.tag == tag) {
            return Err(EnrollError::DuplicateTag(tag));
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::new(Identity {
            name: name.to_string(),
            tag,
            embedding,
        }));
        *current = Arc::new(next);

        tracing::info!(name, tag, enrolled = current.len(), "identity enrolled");
        Ok(())
    }

    /// Current roster snapshot. Cheap (one `Arc` clone); never blocks
    /// behind an in-progress match pass.
    pub fn snapshot(&self) -> Roster {
        self.roster
            .lock()
            .expect("identity roster lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(seed: f32) -> Embedding {
        Embedding::new(vec![seed, seed, seed])
    }

    #[test]
    fn test_enroll_and_snapshot() {
        let store = IdentityStore::new();
        store.enroll("Alice", 7, embedding(0.1)).unwrap();
        store.enroll("Bob", 8, embedding(0.9)).unwrap();

        let roster = store.snapshot();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].name, "Alice");
        assert_eq!(roster[1].tag, 8);
    }

    #[test]
    fn test_duplicate_name_rejected_store_unchanged() {
        let store = IdentityStore::new();
        store.enroll("Alice", 7, embedding(0.1)).unwrap();

        let err = store.enroll("Alice", 9, embedding(0.2)).unwrap_err();
        assert_eq!(err, EnrollError::DuplicateName("Alice".into()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_tag_rejected_store_unchanged() {
        let store = IdentityStore::new();
        store.enroll("Alice", 7, embedding(0.1)).unwrap();

        let err = store.enroll("Carol", 7, embedding(0.2)).unwrap_err();
        assert_eq!(err, EnrollError::DuplicateTag(7));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_is_stable_across_enroll() {
        let store = IdentityStore::new();
        store.enroll("Alice", 7, embedding(0.1)).unwrap();

        let before = store.snapshot();
        store.enroll("Bob", 8, embedding(0.9)).unwrap();

        // The snapshot taken before the enroll is unaffected.
        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_empty_store() {
        let store = IdentityStore::new();
        assert!(store.is_empty());
        assert_eq!(store.snapshot().len(), 0);
    }
}
