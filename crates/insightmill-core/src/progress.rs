//! Resumable progress checkpoint: `{"completed": [...], "failed": [...]}`.
//!
//! The file is rewritten after every item so an interrupted run loses at
//! most the in-flight item. Writers reload and merge immediately before
//! saving so parallel slot workers sharing one file do not clobber each
//! other, and the save itself is a temp-file-plus-rename so readers never
//! observe a truncated document.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::Result;

pub const PROGRESS_FILE: &str = "progress.json";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    /// Items with nothing to transform (e.g. no source text). Not retried,
    /// not counted as completed. Omitted from the document when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl ProgressState {
    /// Load the checkpoint, treating a missing file as an empty state.
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.iter().any(|c| c == id)
    }

    pub fn is_failed(&self, id: &str) -> bool {
        self.failed.iter().any(|f| f == id)
    }

    /// Record a success. Removes the id from `failed`; completion is
    /// terminal, so recording it twice is a no-op.
    pub fn mark_completed(&mut self, id: &str) {
        if !self.is_completed(id) {
            self.completed.push(id.to_string());
        }
        self.failed.retain(|f| f != id);
    }

    /// Record a failure. An id that already completed stays completed.
    pub fn mark_failed(&mut self, id: &str) {
        if self.is_completed(id) {
            return;
        }
        if !self.is_failed(id) {
            self.failed.push(id.to_string());
        }
    }

    pub fn is_skipped(&self, id: &str) -> bool {
        self.skipped.iter().any(|s| s == id)
    }

    /// Record a non-retryable skip. Completed ids stay completed.
    pub fn mark_skipped(&mut self, id: &str) {
        if self.is_completed(id) {
            return;
        }
        if !self.is_skipped(id) {
            self.skipped.push(id.to_string());
        }
        self.failed.retain(|f| f != id);
    }

    /// Ids still worth retrying: failed minus completed.
    pub fn retryable(&self) -> Vec<String> {
        self.failed
            .iter()
            .filter(|f| !self.is_completed(f))
            .cloned()
            .collect()
    }

    /// Atomically replace the on-disk checkpoint with this state.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Reload-merge-write: apply one item transition on top of whatever is on
/// disk right now, then persist. Returns the merged state.
pub async fn record(path: &Path, id: &str, success: bool) -> Result<ProgressState> {
    let mut state = ProgressState::load(path).await?;
    if success {
        state.mark_completed(id);
    } else {
        state.mark_failed(id);
    }
    state.save(path).await?;
    Ok(state)
}

/// Reload-merge-write for a non-retryable skip.
pub async fn record_skipped(path: &Path, id: &str) -> Result<ProgressState> {
    let mut state = ProgressState::load(path).await?;
    state.mark_skipped(id);
    state.save(path).await?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = ProgressState::load(&dir.path().join(PROGRESS_FILE))
            .await
            .unwrap();
        assert!(state.completed.is_empty());
        assert!(state.failed.is_empty());
    }

    #[test]
    fn completion_clears_a_prior_failure() {
        let mut state = ProgressState::default();
        state.mark_failed("Brian Chesky");
        state.mark_completed("Brian Chesky");
        assert!(state.is_completed("Brian Chesky"));
        assert!(!state.is_failed("Brian Chesky"));
    }

    #[test]
    fn failure_never_demotes_a_completed_id() {
        let mut state = ProgressState::default();
        state.mark_completed("Claire Hughes Johnson");
        state.mark_failed("Claire Hughes Johnson");
        assert!(state.is_completed("Claire Hughes Johnson"));
        assert!(!state.is_failed("Claire Hughes Johnson"));
    }

    #[test]
    fn marking_twice_does_not_duplicate() {
        let mut state = ProgressState::default();
        state.mark_completed("a");
        state.mark_completed("a");
        state.mark_failed("b");
        state.mark_failed("b");
        assert_eq!(state.completed, vec!["a"]);
        assert_eq!(state.failed, vec!["b"]);
    }

    #[test]
    fn skip_is_not_a_failure_and_never_demotes() {
        let mut state = ProgressState::default();
        state.mark_failed("empty-episode");
        state.mark_skipped("empty-episode");
        assert!(state.is_skipped("empty-episode"));
        assert!(!state.is_failed("empty-episode"));

        state.mark_completed("done");
        state.mark_skipped("done");
        assert!(state.is_completed("done"));
        assert!(!state.is_skipped("done"));
    }

    #[test]
    fn retryable_excludes_completed() {
        let mut state = ProgressState::default();
        state.failed = vec!["a".into(), "b".into()];
        state.completed = vec!["b".into()];
        assert_eq!(state.retryable(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn record_merges_with_a_sibling_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROGRESS_FILE);

        // Worker on slot 0 records its item...
        record(&path, "episode-a", true).await.unwrap();
        // ...and a sibling on slot 1 records another, after reloading.
        let merged = record(&path, "episode-b", false).await.unwrap();

        assert!(merged.is_completed("episode-a"));
        assert!(merged.is_failed("episode-b"));

        let on_disk = ProgressState::load(&path).await.unwrap();
        assert!(on_disk.is_completed("episode-a"));
        assert!(on_disk.is_failed("episode-b"));
    }

    #[tokio::test]
    async fn save_replaces_atomically_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROGRESS_FILE);

        let mut state = ProgressState::default();
        state.mark_completed("one");
        state.save(&path).await.unwrap();
        state.mark_completed("two");
        state.save(&path).await.unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let loaded = ProgressState::load(&path).await.unwrap();
        assert_eq!(loaded.completed, vec!["one", "two"]);
    }
}
