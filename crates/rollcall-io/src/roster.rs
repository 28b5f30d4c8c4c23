//! Enrollment source: a directory of reference entries named `Name_Tag`.
//!
//! Each entry yields one identity. The embedding comes from an
//! [`EmbeddingExtractor`] — the external detection/embedding capability.
//! The shipped [`SidecarExtractor`] reads precomputed embedding sidecar
//! files, which is how references produced by the capture process arrive
//! on disk. Bad entries are reported and skipped; they never abort the
//! scan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use rollcall_core::{Embedding, EnrollError, IdentityStore};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("reference unreadable: {0}")]
    Io(#[from] io::Error),
    #[error("reference is not an embedding list: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Maps a reference entry on disk to the embeddings found in it.
/// Zero embeddings means no face was found in the reference.
pub trait EmbeddingExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Embedding>, ExtractError>;
}

/// Reads a JSON sidecar containing an array of embedding vectors.
pub struct SidecarExtractor;

impl EmbeddingExtractor for SidecarExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<Embedding>, ExtractError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Why one roster entry was skipped.
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("file stem is not a Name_Tag pair: {0}")]
    MalformedStem(String),
    #[error("no face found in reference: {0}")]
    NoFaceDetected(String),
    #[error(transparent)]
    Conflict(#[from] EnrollError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// Outcome of a roster scan.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub enrolled: usize,
    pub skipped: usize,
}

/// Split a file stem into its `(name, tag)` pair.
///
/// The tag is everything after the LAST underscore, so names may contain
/// underscores themselves (`John_Doe_123` → `John_Doe`, 123). The tag
/// must parse as a positive integer.
fn parse_stem(stem: &str) -> Result<(&str, u32), EntryError> {
    let (name, tag) = stem
        .rsplit_once('_')
        .ok_or_else(|| EntryError::MalformedStem(stem.to_string()))?;

    let tag: u32 = tag
        .parse()
        .map_err(|_| EntryError::MalformedStem(stem.to_string()))?;
    if name.is_empty() || tag == 0 {
        return Err(EntryError::MalformedStem(stem.to_string()));
    }

    Ok((name, tag))
}

fn enroll_entry(
    path: &Path,
    extractor: &impl EmbeddingExtractor,
    store: &IdentityStore,
) -> Result<(), EntryError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| EntryError::MalformedStem(path.display().to_string()))?;
    let (name, tag) = parse_stem(stem)?;

    let embeddings = extractor.extract(path)?;
    let embedding = embeddings
        .into_iter()
        .next()
        .ok_or_else(|| EntryError::NoFaceDetected(path.display().to_string()))?;

    store.enroll(name, tag, embedding)?;
    Ok(())
}

/// Enroll every reference entry in `dir` into `store`.
///
/// Entries are visited in lexical order so repeated scans enroll in a
/// stable order. An unreadable directory is fatal; a bad entry is logged
/// and counted as skipped.
pub fn scan_roster(
    dir: &Path,
    extractor: &impl EmbeddingExtractor,
    store: &IdentityStore,
) -> Result<ScanSummary, io::Error> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    let mut summary = ScanSummary::default();
    for path in &entries {
        match enroll_entry(path, extractor, store) {
            Ok(()) => summary.enrolled += 1,
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "skipped roster entry");
                summary.skipped += 1;
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        enrolled = summary.enrolled,
        skipped = summary.skipped,
        "roster scan complete"
    );
    Ok(summary)
}
