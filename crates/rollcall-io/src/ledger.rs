//! Append-only CSV attendance ledger.
//!
//! Schema is an external contract consumed by downstream reporting:
//! header `Name,Face ID,Status,Date-Time`, one record per accepted event,
//! timestamps as `%Y-%m-%d %H:%M:%S`. The header is written exactly once,
//! when the file is created.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use rollcall_core::AttendanceEvent;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HEADER: [&str; 4] = ["Name", "Face ID", "Status", "Date-Time"];

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger open failed: {0}")]
    Io(#[from] io::Error),
    #[error("ledger write failed: {0}")]
    Csv(#[from] csv::Error),
}

fn write_event<W: Write>(
    writer: &mut csv::Writer<W>,
    event: &AttendanceEvent,
) -> Result<(), csv::Error> {
    writer.write_record([
        event.name.as_str(),
        &event.tag.to_string(),
        &event.status.to_string(),
        &event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
    ])
}

/// File-backed ledger. Each append opens, writes, and flushes, so a crash
/// between events never loses flushed records.
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AttendanceEvent) -> Result<(), LedgerError> {
        let new_file = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::Writer::from_writer(file);
        if new_file {
            writer.write_record(HEADER)?;
        }
        write_event(&mut writer, event)?;
        writer.flush()?;

        tracing::debug!(
            name = %event.name,
            tag = event.tag,
            status = %event.status,
            "attendance recorded"
        );
        Ok(())
    }
}
