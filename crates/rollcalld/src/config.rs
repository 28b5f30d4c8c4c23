use std::path::PathBuf;

use rollcall_core::{MatchEngine, DEFAULT_COOLDOWN_SECS};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory of reference entries named `Name_Tag`.
    pub roster_dir: PathBuf,
    /// Path to the attendance CSV file.
    pub ledger_path: PathBuf,
    /// Frame feed path; `None` reads the feed from stdin.
    pub frame_feed: Option<PathBuf>,
    /// Euclidean distance tolerance for a positive match.
    pub match_threshold: f32,
    /// Seconds during which repeat sightings of one person are ignored.
    pub cooldown_secs: i64,
    /// Frames to wait for a face during interactive registration.
    pub register_frame_budget: usize,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let roster_dir = std::env::var("ROLLCALL_ROSTER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("roster"));

        let ledger_path = std::env::var("ROLLCALL_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.csv"));

        let frame_feed = std::env::var("ROLLCALL_FRAME_FEED")
            .ok()
            .filter(|v| v != "-")
            .map(PathBuf::from);

        Self {
            roster_dir,
            ledger_path,
            frame_feed,
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", MatchEngine::DEFAULT_THRESHOLD),
            cooldown_secs: env_i64("ROLLCALL_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS),
            register_frame_budget: env_usize("ROLLCALL_REGISTER_FRAME_BUDGET", 30),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
