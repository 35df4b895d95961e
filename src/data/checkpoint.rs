//! Resume points for long site runs.
//!
//! A checkpoint is written after every completed unit and removed once the run
//! finishes. Loading does not check that the stored indices still describe the
//! current term/unit lists; a stale file simply resumes at the stored position.

use crate::data::records::{CourseRecord, RunStats};
use crate::scraper::json::parse_json_with_context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CHECKPOINT_FILE: &str = "scraper_checkpoint.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the term being processed.
    pub year_idx: usize,
    /// Index of the next unit to process within that term.
    pub dept_idx: usize,
    pub records: Vec<CourseRecord>,
    pub stats: RunStats,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under `dir` using the conventional file name.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the checkpoint, replacing any previous one.
    pub fn save(&self, checkpoint: &Checkpoint) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(checkpoint)?;
        // Write beside the target and rename so an interrupted save never truncates the old one.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            year_idx = checkpoint.year_idx,
            dept_idx = checkpoint.dept_idx,
            records = checkpoint.records.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load the stored checkpoint. A missing or unreadable file yields `None`.
    pub fn load(&self) -> Option<Checkpoint> {
        let body = match std::fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read checkpoint, starting fresh");
                return None;
            }
        };

        match parse_json_with_context::<Checkpoint>(&body) {
            Ok(checkpoint) => {
                info!(
                    year_idx = checkpoint.year_idx,
                    dept_idx = checkpoint.dept_idx,
                    records = checkpoint.records.len(),
                    "Resuming from checkpoint"
                );
                Some(checkpoint)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt checkpoint, starting fresh");
                None
            }
        }
    }

    /// Remove the checkpoint after a fully successful run.
    pub fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str, enrolled: u32) -> CourseRecord {
        CourseRecord {
            enrolled: Some(enrolled),
            term: Some("20232024".to_string()),
            ..CourseRecord::new(code)
        }
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(dir.path());

        let checkpoint = Checkpoint {
            year_idx: 2,
            dept_idx: 5,
            records: vec![record("CS 106A", 300), record("CS 106B", 250)],
            stats: RunStats {
                total_courses: 2,
                units_processed: 5,
                errors: 1,
            },
        };
        store.save(&checkpoint).unwrap();

        let loaded = store.load().expect("checkpoint should load");
        assert_eq!(loaded.year_idx, 2);
        assert_eq!(loaded.dept_idx, 5);
        assert_eq!(loaded.records, checkpoint.records);
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointStore::in_dir(dir.path()).load().is_none());
    }

    #[test]
    fn test_load_corrupt_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(dir.path());
        std::fs::write(store.path(), "{\"year_idx\": \"two\"").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_overwrites_and_clear_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::in_dir(&dir.path().join("stanford"));

        store.save(&Checkpoint::default()).unwrap();
        let later = Checkpoint {
            dept_idx: 3,
            ..Checkpoint::default()
        };
        store.save(&later).unwrap();
        assert_eq!(store.load().unwrap().dept_idx, 3);

        store.clear().unwrap();
        assert!(!store.path().exists());
        // Clearing twice is not an error.
        store.clear().unwrap();
    }
}
