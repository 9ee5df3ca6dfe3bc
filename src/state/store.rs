//! Low-level IO for the `.switchboard/` directory.
//!
//! All paths are relative to the current working directory so the tool works
//! in any git repo without configuration. Reads degrade to sensible defaults
//! on any error (missing file, corrupt JSON, schema drift); only writes
//! propagate `StateError` (spec.md §4.1, §4.7).

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{Result, StateError};
use crate::state::model::{ActiveRun, RepoState};

pub const SWITCHBOARD_DIR: &str = ".switchboard";
pub const STATE_FILE: &str = ".switchboard/state.json";
pub const HANDOFF_FILE: &str = ".switchboard/handoff.md";
pub const TRANSCRIPT_FILE: &str = ".switchboard/transcript.ndjson";
pub const ACTIVE_RUN_FILE: &str = ".switchboard/active.json";
pub const REPO_CONFIG_FILE: &str = ".switchboard/config.toml";

/// `~/.config/switchboard/config.toml`, the user-global config layer.
/// Returns `None` if the home directory cannot be resolved.
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("switchboard").join("config.toml"))
}

fn ensure_dir() -> Result<()> {
    std::fs::create_dir_all(SWITCHBOARD_DIR).map_err(|source| {
        StateError::CreateDir {
            path: SWITCHBOARD_DIR.to_string(),
            source,
        }
        .into()
    })
}

/// Write `contents` to `path` atomically: write to a sibling temp file, then
/// rename over the destination. Avoids a reader observing a half-written file.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    {
        let mut f = std::fs::File::create(&tmp_path).map_err(|source| StateError::Write {
            path: tmp_path.display().to_string(),
            source,
        })?;
        f.write_all(contents.as_bytes())
            .map_err(|source| StateError::Write {
                path: tmp_path.display().to_string(),
                source,
            })?;
    }
    std::fs::rename(&tmp_path, path).map_err(|source| StateError::Write {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

// ── State read/write ─────────────────────────────────────────────────────

/// Load `state.json`. Returns a fresh default state if the file is missing
/// or fails to parse — never an error.
pub fn load_state() -> RepoState {
    let Ok(text) = std::fs::read_to_string(STATE_FILE) else {
        return RepoState::default();
    };
    match serde_json::from_str(&text) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(error = %e, "state.json failed to parse, starting fresh");
            RepoState::default()
        }
    }
}

/// Persist `state`, bumping `updated_at` to now.
pub fn save_state(state: &mut RepoState) -> Result<()> {
    ensure_dir()?;
    state.updated_at = Utc::now();
    let json = serde_json::to_string_pretty(state).map_err(|source| StateError::Serialize {
        what: "state".to_string(),
        source,
    })?;
    write_atomic(Path::new(STATE_FILE), &json)
}

// ── Handoff read/write ───────────────────────────────────────────────────

/// Return the contents of `handoff.md`, or `None` if it doesn't exist.
pub fn load_handoff() -> Option<String> {
    std::fs::read_to_string(HANDOFF_FILE).ok()
}

/// Overwrite `handoff.md` with new content.
pub fn save_handoff(content: &str) -> Result<()> {
    ensure_dir()?;
    write_atomic(Path::new(HANDOFF_FILE), content)
}

// ── Transcript ────────────────────────────────────────────────────────────

/// Append one JSON line to `transcript.ndjson`. Append-only; never truncated.
pub fn append_transcript<T: serde::Serialize>(entry: &T) -> Result<()> {
    ensure_dir()?;
    let line = serde_json::to_string(entry).map_err(|source| StateError::Serialize {
        what: "transcript record".to_string(),
        source,
    })?;
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(TRANSCRIPT_FILE)
        .map_err(|source| StateError::Write {
            path: TRANSCRIPT_FILE.to_string(),
            source,
        })?;
    writeln!(f, "{line}").map_err(|source| StateError::Write {
        path: TRANSCRIPT_FILE.to_string(),
        source,
    })?;
    Ok(())
}

// ── Active run metadata ──────────────────────────────────────────────────

/// Return active-run metadata from `active.json`, or `None` if missing or
/// unreadable (treated the same as missing).
pub fn load_active_run() -> Option<ActiveRun> {
    let text = std::fs::read_to_string(ACTIVE_RUN_FILE).ok()?;
    serde_json::from_str(&text).ok()
}

/// Overwrite `active.json` with the current in-flight run metadata.
pub fn save_active_run(entry: &ActiveRun) -> Result<()> {
    ensure_dir()?;
    let json = serde_json::to_string_pretty(entry).map_err(|source| StateError::Serialize {
        what: "active run".to_string(),
        source,
    })?;
    write_atomic(Path::new(ACTIVE_RUN_FILE), &json)
}

/// Delete `active.json` if present. A missing file is not an error; any
/// other failure to delete is swallowed too — this runs from `Drop`, where
/// there is no good way to surface a failure (spec.md §4.7).
pub fn clear_active_run() {
    if let Err(e) = std::fs::remove_file(ACTIVE_RUN_FILE) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, "failed to clear active run marker");
        }
    }
}

// ── Reset ─────────────────────────────────────────────────────────────────

/// Delete the entire `.switchboard/` directory (used by `switchboard reset`).
pub fn wipe() -> Result<()> {
    match std::fs::remove_dir_all(SWITCHBOARD_DIR) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StateError::Delete {
            path: SWITCHBOARD_DIR.to_string(),
            source,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests touch the real CWD-relative .switchboard/ directory, so they must
    // not run concurrently with each other.
    static DIR_LOCK: Mutex<()> = Mutex::new(());

    struct TempCwdGuard {
        _tempdir: tempfile::TempDir,
        original: PathBuf,
    }

    impl Drop for TempCwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.original);
        }
    }

    fn in_temp_cwd() -> TempCwdGuard {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let original = std::env::current_dir().expect("cwd");
        std::env::set_current_dir(tempdir.path()).expect("chdir");
        TempCwdGuard {
            _tempdir: tempdir,
            original,
        }
    }

    #[test]
    fn load_state_defaults_when_missing() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        let state = load_state();
        assert_eq!(state.turn_count, 0);
    }

    #[test]
    fn save_then_load_state_round_trips() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        let mut state = RepoState::default();
        state.turn_count = 5;
        save_state(&mut state).expect("save");
        let reloaded = load_state();
        assert_eq!(reloaded.turn_count, 5);
    }

    #[test]
    fn load_state_recovers_from_corrupt_file() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        std::fs::create_dir_all(SWITCHBOARD_DIR).unwrap();
        std::fs::write(STATE_FILE, "{not json").unwrap();
        let state = load_state();
        assert_eq!(state.turn_count, 0);
    }

    #[test]
    fn handoff_round_trips() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        assert!(load_handoff().is_none());
        save_handoff("# Handoff\n").expect("save");
        assert_eq!(load_handoff().as_deref(), Some("# Handoff\n"));
    }

    #[test]
    fn active_run_save_load_clear() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        assert!(load_active_run().is_none());
        let entry = ActiveRun {
            pid: 123,
            mode: "ask".into(),
            started_at: Utc::now(),
            provider: None,
            prompt_excerpt: "hello".into(),
        };
        save_active_run(&entry).expect("save");
        let loaded = load_active_run().expect("loaded");
        assert_eq!(loaded.pid, 123);
        clear_active_run();
        assert!(load_active_run().is_none());
    }

    #[test]
    fn clear_active_run_missing_file_is_not_an_error() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        clear_active_run();
    }

    #[test]
    fn wipe_removes_directory() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        save_handoff("data").expect("save");
        assert!(Path::new(SWITCHBOARD_DIR).exists());
        wipe().expect("wipe");
        assert!(!Path::new(SWITCHBOARD_DIR).exists());
    }

    #[test]
    fn wipe_on_missing_directory_is_ok() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        wipe().expect("wipe of missing dir is a no-op");
    }

    #[test]
    fn append_transcript_appends_multiple_lines() {
        let _lock = DIR_LOCK.lock().unwrap();
        let _guard = in_temp_cwd();
        append_transcript(&serde_json::json!({"a": 1})).unwrap();
        append_transcript(&serde_json::json!({"a": 2})).unwrap();
        let text = std::fs::read_to_string(TRANSCRIPT_FILE).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
