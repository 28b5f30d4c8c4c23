//! Pull-based frame feeds.
//!
//! The camera, face detector, and embedding model live outside this
//! repository. What reaches us is one batch of observed faces per frame,
//! already embedded. `JsonlSource` is the shipped transport: one JSON
//! object per line on any buffered reader (a pipe from the capture
//! process, or a recorded file).

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use rollcall_core::ObservedFace;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("frame feed read failed: {0}")]
    Io(#[from] io::Error),
    #[error("frame feed line {line} is not a frame record: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
}

/// Supplies detected faces one frame at a time.
///
/// `Ok(None)` means the feed ended (recorded feeds only; a live feed is
/// infinite and not restartable). Read failures surface as errors — a
/// broken feed is never reported as "no face".
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Vec<ObservedFace>>, SourceError>;
}

#[derive(Deserialize)]
struct FrameRecord {
    faces: Vec<ObservedFace>,
}

/// Frame feed reading one `{"faces": [...]}` JSON object per line.
pub struct JsonlSource<R> {
    reader: R,
    line: usize,
}

impl JsonlSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> JsonlSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: 0 }
    }
}

impl<R: BufRead> FrameSource for JsonlSource<R> {
    fn next_frame(&mut self) -> Result<Option<Vec<ObservedFace>>, SourceError> {
        loop {
            let mut buf = String::new();
            if self.reader.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            if buf.trim().is_empty() {
                continue;
            }

            let record: FrameRecord =
                serde_json::from_str(&buf).map_err(|source| SourceError::Malformed {
                    line: self.line,
                    source,
                })?;
            return Ok(Some(record.faces));
        }
    }
}
