use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One source unit to be transformed end-to-end, derived from a filename.
#[derive(Clone, Debug)]
pub struct WorkItem {
    pub id: String,
    pub path: PathBuf,
}

/// Per-episode translation document (`<id>.json` in the output directory).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptDoc {
    pub guest: String,
    pub en: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zh: Option<String>,
    #[serde(default)]
    pub chunks_count: usize,
}

impl TranscriptDoc {
    pub fn new(guest: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            guest: guest.into(),
            en: en.into(),
            zh: None,
            chunks_count: 0,
        }
    }
}

/// Definite per-item outcome crossing the batch-loop boundary. Errors are
/// converted into these; nothing propagates past an item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    Failed(String),
    /// The item has nothing to transform (e.g. no English text). Recorded
    /// as a skip, not a failure, so it is not retried forever.
    NoSourceText,
    /// Already recorded as completed or skipped; no model call was made.
    SkippedCompleted,
}

/// Aggregate tally reported at the end of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Size of this slot's full id list before windowing, so callers can
    /// tell whether another window remains past this one.
    pub universe: usize,
    pub outcomes: Vec<(String, ItemOutcome)>,
}

impl BatchSummary {
    pub fn push(&mut self, id: String, outcome: ItemOutcome) {
        match &outcome {
            ItemOutcome::Completed => {
                self.attempted += 1;
                self.completed += 1;
            }
            ItemOutcome::Failed(_) => {
                self.attempted += 1;
                self.failed += 1;
            }
            ItemOutcome::NoSourceText | ItemOutcome::SkippedCompleted => self.skipped += 1,
        }
        self.outcomes.push((id, outcome));
    }
}
