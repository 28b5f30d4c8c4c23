//! rollcall-io — the boundary between the decision core and the world.
//!
//! Frame feeds (pull-based batches of observed faces), the roster
//! directory scan that seeds the identity store, and the append-only CSV
//! attendance ledger. Camera capture and the embedding model itself live
//! in external processes; this crate only speaks their on-disk and
//! on-pipe formats.

pub mod ledger;
pub mod roster;
pub mod source;

pub use ledger::{CsvLedger, LedgerError, TIMESTAMP_FORMAT};
pub use roster::{
    scan_roster, EmbeddingExtractor, EntryError, ExtractError, ScanSummary, SidecarExtractor,
};
pub use source::{FrameSource, JsonlSource, SourceError};
