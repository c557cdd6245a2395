//! Discovers work item identifiers and carves them into batches.

use std::path::Path;

use tokio::fs;

use crate::error::Result;
use crate::progress::ProgressState;

/// Identifiers (file stems) of every `.{ext}` file in `dir`,
/// lexicographically sorted so batch windows and slot assignments are
/// deterministic across runs and machines.
pub async fn list_items(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Identifiers from an explicit list file, one per line, blanks skipped.
pub async fn read_id_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Drop identifiers already recorded as completed or skipped, unless
/// forced.
pub fn pending(ids: Vec<String>, progress: &ProgressState, force: bool) -> Vec<String> {
    if force {
        return ids;
    }
    ids.into_iter()
        .filter(|id| !progress.is_completed(id) && !progress.is_skipped(id))
        .collect()
}

/// Modulo partition for parallel workers: slot `k` of `n` owns the ids at
/// positions `i` where `i % n == k`. Slots are disjoint and together cover
/// the full list exactly once.
pub fn assign_slot(ids: &[String], workers: usize, slot: usize) -> Vec<String> {
    assert!(workers > 0, "worker count must be positive");
    assert!(slot < workers, "slot {slot} out of range for {workers} workers");
    ids.iter()
        .enumerate()
        .filter(|(i, _)| i % workers == slot)
        .map(|(_, id)| id.clone())
        .collect()
}

/// Offset/count batch window over the id list.
pub fn window(ids: &[String], start: usize, count: usize) -> Vec<String> {
    ids.iter().skip(start).take(count).cloned().collect()
}
