//! Per-identity IN/OUT toggling gated by a cooldown window.
//!
//! The machine never reads the clock; `now` always comes from the caller.
//! Each name has its own state slot behind its own mutex, so the
//! read-decide-write in [`AttendanceStateMachine::observe`] is atomic per
//! name while observations for different names proceed in parallel.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Identity;

/// Entry/exit status of an attendance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    In,
    Out,
}

impl Status {
    pub fn toggled(self) -> Self {
        match self {
            Status::In => Status::Out,
            Status::Out => Status::In,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::In => f.write_str("IN"),
            Status::Out => f.write_str("OUT"),
        }
    }
}

/// Last accepted event for one name. Exists only once a first event has
/// been accepted; never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceState {
    pub last_event_time: DateTime<Utc>,
    pub last_status: Status,
}

/// An accepted attendance record, handed off to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub name: String,
    pub tag: u32,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one sighting of a matched identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Accepted(AttendanceEvent),
    Suppressed,
}

pub struct AttendanceStateMachine {
    cooldown: Duration,
    states: RwLock<HashMap<String, Arc<Mutex<Option<AttendanceState>>>>>,
}

/// Window within which repeat sightings of the same person are ignored.
pub const DEFAULT_COOLDOWN_SECS: i64 = 300;

impl Default for AttendanceStateMachine {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }
}

impl AttendanceStateMachine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Decide whether this sighting produces a new attendance event.
    ///
    /// First sighting of a name is always accepted with status IN. After
    /// that, sightings inside the cooldown window are suppressed without
    /// touching state; a sighting at or past the window boundary is
    /// accepted with the toggled status.
    pub fn observe(&self, identity: &Identity, now: DateTime<Utc>) -> Observation {
        let slot = self.slot(&identity.name);
        let mut state = slot.lock().expect("attendance state lock poisoned");

        let status = match *state {
            None => Status::In,
            Some(prev) if now - prev.last_event_time < self.cooldown => {
                tracing::debug!(name = %identity.name, "sighting inside cooldown window");
                return Observation::Suppressed;
            }
            Some(prev) => prev.last_status.toggled(),
        };

        *state = Some(AttendanceState {
            last_event_time: now,
            last_status: status,
        });

        Observation::Accepted(AttendanceEvent {
            name: identity.name.clone(),
            tag: identity.tag,
            status,
            timestamp: now,
        })
    }

    /// Last accepted state for a name, if any event has been accepted.
    pub fn state_of(&self, name: &str) -> Option<AttendanceState> {
        let states = self.states.read().expect("attendance state map poisoned");
        states
            .get(name)
            .and_then(|slot| *slot.lock().expect("attendance state lock poisoned"))
    }

    fn slot(&self, name: &str) -> Arc<Mutex<Option<AttendanceState>>> {
        {
            let states = self.states.read().expect("attendance state map poisoned");
            if let Some(slot) = states.get(name) {
                return Arc::clone(slot);
            }
        }
        let mut states = self.states.write().expect("attendance state map poisoned");
        Arc::clone(states.entry(name.to_string()).or_default())
    }
}
