//! rollcall-core — Identity matching and attendance state engine.
//!
//! Given a stream of face embeddings from an external detection/embedding
//! stack, decides who was seen, whether they are going IN or OUT, and
//! whether a new attendance event should be recorded at all. Pure decision
//! logic: no I/O, no clock reads, no rendering.

pub mod attendance;
pub mod matcher;
pub mod store;
pub mod types;

pub use attendance::{
    AttendanceEvent, AttendanceState, AttendanceStateMachine, Observation, Status,
    DEFAULT_COOLDOWN_SECS,
};
pub use matcher::{FirstBelowThreshold, Match, MatchEngine, Matcher};
pub use store::{EnrollError, Identity, IdentityStore, Roster};
pub use types::{BoundingBox, Embedding, ObservedFace};
