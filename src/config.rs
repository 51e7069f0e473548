//! Effective engine settings, read from the `setup.*` sections of the
//! workspace `settings` table. Missing or out-of-range keys fall back to
//! defaults so a fresh workspace behaves sensibly with no setup at all.

use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const DEFAULT_COMPLETION_THRESHOLD: f64 = 0.9;
pub const DEFAULT_PIN_SPACE: u32 = 1_000_000;
pub const DEFAULT_PIN_MAX_ATTEMPTS: u32 = 10;
pub const MAX_PIN_ATTEMPTS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSetup {
    /// watched/total ratio at which a video counts as completed.
    pub completion_threshold: f64,
}

impl Default for ProgressSetup {
    fn default() -> Self {
        Self {
            completion_threshold: DEFAULT_COMPLETION_THRESHOLD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassroomSetup {
    /// PINs are drawn from `0..pin_space`, zero-padded to six digits.
    pub pin_space: u32,
    pub pin_max_attempts: u32,
}

impl Default for ClassroomSetup {
    fn default() -> Self {
        Self {
            pin_space: DEFAULT_PIN_SPACE,
            pin_max_attempts: DEFAULT_PIN_MAX_ATTEMPTS,
        }
    }
}

pub fn valid_threshold(v: f64) -> bool {
    v.is_finite() && v > 0.0 && v <= 1.0
}

fn load_section(conn: &Connection, key: &str) -> Map<String, Value> {
    db::settings_get_json(conn, key)
        .ok()
        .flatten()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

pub fn load_progress_setup(conn: &Connection) -> ProgressSetup {
    let obj = load_section(conn, "setup.progress");
    let completion_threshold = obj
        .get("completionThreshold")
        .and_then(|v| v.as_f64())
        .filter(|v| valid_threshold(*v))
        .unwrap_or(DEFAULT_COMPLETION_THRESHOLD);
    ProgressSetup {
        completion_threshold,
    }
}

pub fn load_classroom_setup(conn: &Connection) -> ClassroomSetup {
    let obj = load_section(conn, "setup.classrooms");
    let pin_space = obj
        .get("pinSpace")
        .and_then(|v| v.as_u64())
        .filter(|v| (1..=DEFAULT_PIN_SPACE as u64).contains(v))
        .map(|v| v as u32)
        .unwrap_or(DEFAULT_PIN_SPACE);
    let pin_max_attempts = obj
        .get("pinMaxAttempts")
        .and_then(|v| v.as_u64())
        .filter(|v| (1..=MAX_PIN_ATTEMPTS as u64).contains(v))
        .map(|v| v as u32)
        .unwrap_or(DEFAULT_PIN_MAX_ATTEMPTS);
    ClassroomSetup {
        pin_space,
        pin_max_attempts,
    }
}

pub fn progress_setup_json(s: &ProgressSetup) -> Value {
    json!({ "completionThreshold": s.completion_threshold })
}

pub fn classroom_setup_json(s: &ClassroomSetup) -> Value {
    json!({
        "pinSpace": s.pin_space,
        "pinMaxAttempts": s.pin_max_attempts,
    })
}
