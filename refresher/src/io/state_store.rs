//! Durable run counters (`agents/state.json` by default).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::io::write_atomic;

/// Persisted counters. Unknown keys in the file are ignored and dropped on write.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunState {
    /// Value shown on the page by counter-mode fragments.
    pub counter: u64,
    /// Number of committed runs.
    pub iteration: u64,
}

impl RunState {
    /// State after one committed run that settled on `next_counter`.
    pub fn advance(self, next_counter: u64) -> Self {
        Self {
            counter: next_counter,
            iteration: self.iteration.saturating_add(1),
        }
    }
}

/// Load run state from disk, falling back to the zero state.
///
/// Never fails: a missing, unreadable, or malformed file yields `RunState::default()`.
pub fn load_run_state(path: &Path) -> RunState {
    debug!(path = %path.display(), "loading run state");
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            if path.exists() {
                warn!(path = %path.display(), err = %err, "unreadable run state, using defaults");
            } else {
                debug!(path = %path.display(), "no run state yet, using defaults");
            }
            return RunState::default();
        }
    };
    match serde_json::from_str::<RunState>(&contents) {
        Ok(state) => {
            debug!(
                counter = state.counter,
                iteration = state.iteration,
                "run state loaded"
            );
            state
        }
        Err(err) => {
            warn!(path = %path.display(), err = %err, "corrupt run state, using defaults");
            RunState::default()
        }
    }
}

/// Atomically write run state to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RunState) -> Result<()> {
    debug!(
        path = %path.display(),
        counter = state.counter,
        iteration = state.iteration,
        "writing run state"
    );
    let mut buf = serde_json::to_string_pretty(state).context("serialize run state")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_zero_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let state = load_run_state(&temp.path().join("state.json"));
        assert_eq!(
            state,
            RunState {
                counter: 0,
                iteration: 0
            }
        );
    }

    #[test]
    fn corrupt_file_loads_zero_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        for contents in ["{not json", "", "\"text\"", "{\"counter\": -4}"] {
            fs::write(&path, contents).expect("write");
            assert_eq!(load_run_state(&path), RunState::default(), "{contents:?}");
        }
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        fs::write(&path, "{\"counter\": 7, \"legacy\": true}").expect("write");
        assert_eq!(
            load_run_state(&path),
            RunState {
                counter: 7,
                iteration: 0
            }
        );
    }

    /// Verifies write -> read preserves exact values and creates parent dirs.
    #[test]
    fn run_state_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agents").join("state.json");

        let state = RunState {
            counter: 41,
            iteration: 12,
        };
        write_run_state(&path, &state).expect("write");
        assert_eq!(load_run_state(&path), state);
        assert!(!temp.path().join("agents").join("state.json.tmp").exists());
    }

    /// Guards against accidental changes to the on-disk format.
    #[test]
    fn run_state_format_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        fs::write(&path, "{\"counter\": 1, \"iteration\": 1, \"extra\": \"x\"}").expect("seed");

        write_run_state(&path, &RunState::default()).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "{\n  \"counter\": 0,\n  \"iteration\": 0\n}\n");
    }

    #[test]
    fn advance_increments_iteration() {
        let next = RunState {
            counter: 4,
            iteration: 9,
        }
        .advance(5);
        assert_eq!(
            next,
            RunState {
                counter: 5,
                iteration: 10
            }
        );
    }
}
