//! The batch transform driver: input discovery, resume filtering,
//! per-item chunking, model invocation, reassembly and checkpointed
//! persistence.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::{fs, sync::Semaphore, task::JoinSet, time::sleep};

use crate::chunk::split_chunks;
use crate::client::ModelBackend;
use crate::config::MillConfig;
use crate::error::{MillError, Result};
use crate::extract::extract_json;
use crate::progress::{PROGRESS_FILE, ProgressState, record, record_skipped};
use crate::prompt::{extraction_prompt, translation_prompt};
use crate::source::{assign_slot, list_items, pending, read_id_list, window};
use crate::types::{BatchSummary, ItemOutcome, TranscriptDoc, WorkItem};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Chunked EN -> ZH translation into per-episode documents.
    Translate,
    /// Structured methodology extraction into `json/<id>.json`.
    Extract,
}

/// One run of the driver: which items, which transform, which window.
#[derive(Clone, Debug)]
pub struct BatchPlan {
    pub task: TaskKind,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Offset into the pending list after partitioning.
    pub start: usize,
    pub count: usize,
    /// Modulo partition for parallel workers sharing one progress file.
    pub workers: usize,
    pub slot: usize,
    /// Explicit id list file instead of directory discovery.
    pub id_list: Option<PathBuf>,
    /// Process the ids currently recorded as failed.
    pub retry_failed: bool,
    /// Bounded fan-out across chunks instead of sequential-with-delay.
    pub concurrent: bool,
}

impl BatchPlan {
    pub fn new(task: TaskKind, input_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            task,
            input_dir,
            output_dir,
            start: 0,
            count: usize::MAX,
            workers: 1,
            slot: 0,
            id_list: None,
            retry_failed: false,
            concurrent: false,
        }
    }
}

/// Translate every chunk of one item, returning per-chunk results in input
/// order. Concurrent mode schedules all chunks at once under a counting
/// semaphore and resequences completions by index.
async fn translate_chunks<B: ModelBackend + 'static>(
    backend: &Arc<B>,
    cfg: &MillConfig,
    id: &str,
    chunks: Vec<String>,
    concurrent: bool,
) -> Vec<Result<String>> {
    let total = chunks.len();

    if !concurrent {
        let mut results = Vec::with_capacity(total);
        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 && !cfg.call_delay.is_zero() {
                sleep(cfg.call_delay).await;
            }
            let result = backend.complete(&translation_prompt(chunk)).await;
            let failed = result.is_err();
            results.push(result);
            // Under strict reassembly the item is already lost; spare the
            // remaining calls.
            if failed && cfg.strict_reassembly {
                break;
            }
        }
        return results;
    }

    let semaphore = Arc::new(Semaphore::new(cfg.max_concurrency));
    let mut tasks = JoinSet::new();
    for (index, chunk) in chunks.into_iter().enumerate() {
        let backend = Arc::clone(backend);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            (index, backend.complete(&translation_prompt(&chunk)).await)
        });
    }

    let mut slots: Vec<Option<Result<String>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        if let Ok((index, result)) = joined {
            slots[index] = Some(result);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                Err(MillError::ChunkFailed {
                    id: id.to_string(),
                    index,
                    total,
                    reason: "translation task aborted".to_string(),
                })
            })
        })
        .collect()
}

/// Translate one item's English text into `doc.zh`.
///
/// Strict reassembly (the default) fails the whole item on any chunk
/// failure; lenient mode drops the failed chunk and keeps going.
pub async fn translate_item<B: ModelBackend + 'static>(
    backend: &Arc<B>,
    cfg: &MillConfig,
    id: &str,
    doc: &mut TranscriptDoc,
    concurrent: bool,
) -> Result<()> {
    if doc.en.trim().is_empty() {
        return Err(MillError::NoSourceText { id: id.to_string() });
    }

    let chunks = split_chunks(&doc.en, cfg.chunk_size);
    let total = chunks.len();
    doc.chunks_count = total;

    let results = translate_chunks(backend, cfg, id, chunks, concurrent).await;

    let mut parts = Vec::with_capacity(total);
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(text) => parts.push(text),
            Err(e) if cfg.strict_reassembly => {
                return Err(MillError::ChunkFailed {
                    id: id.to_string(),
                    index,
                    total,
                    reason: e.to_string(),
                });
            }
            Err(_) => {}
        }
    }

    doc.zh = Some(parts.join("\n\n"));
    Ok(())
}

/// One extraction call for a whole transcript, returning the parsed JSON
/// object with the item id injected as `filename`.
pub async fn extract_item<B: ModelBackend>(
    backend: &B,
    id: &str,
    transcript: &str,
) -> Result<Value> {
    if transcript.trim().is_empty() {
        return Err(MillError::NoSourceText { id: id.to_string() });
    }

    let completion = backend.complete(&extraction_prompt(transcript)).await?;
    let mut value = extract_json(&completion)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("filename".to_string(), Value::String(id.to_string()));
    }
    Ok(value)
}

async fn write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, &json).await?;
    Ok(())
}

async fn process_translate<B: ModelBackend + 'static>(
    backend: &Arc<B>,
    cfg: &MillConfig,
    plan: &BatchPlan,
    item: &WorkItem,
) -> Result<()> {
    let doc_path = plan.output_dir.join(format!("{}.json", item.id));

    // Prefer an existing per-episode document (retranslation); fall back to
    // the raw transcript.
    let mut doc = match fs::read_to_string(&doc_path).await {
        Ok(content) => serde_json::from_str::<TranscriptDoc>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let text = fs::read_to_string(&item.path).await?;
            TranscriptDoc::new(&item.id, text)
        }
        Err(e) => return Err(e.into()),
    };

    translate_item(backend, cfg, &item.id, &mut doc, plan.concurrent).await?;
    write_json_pretty(&doc_path, &doc).await
}

async fn process_extract<B: ModelBackend>(
    backend: &B,
    plan: &BatchPlan,
    item: &WorkItem,
) -> Result<()> {
    let transcript = fs::read_to_string(&item.path).await?;

    let value = extract_item(backend, &item.id, &transcript).await?;

    let json_dir = plan.output_dir.join("json");
    fs::create_dir_all(&json_dir).await?;
    write_json_pretty(&json_dir.join(format!("{}.json", item.id)), &value).await
}

/// Process one item, converting every error into a definite outcome. No
/// error crosses into the batch loop.
async fn process_one<B: ModelBackend + 'static>(
    backend: &Arc<B>,
    cfg: &MillConfig,
    plan: &BatchPlan,
    item: &WorkItem,
) -> ItemOutcome {
    let result = match plan.task {
        TaskKind::Translate => process_translate(backend, cfg, plan, item).await,
        TaskKind::Extract => process_extract(backend.as_ref(), plan, item).await,
    };
    match result {
        Ok(()) => ItemOutcome::Completed,
        Err(MillError::NoSourceText { .. }) => ItemOutcome::NoSourceText,
        Err(e) => ItemOutcome::Failed(e.to_string()),
    }
}

/// Run one batch: discover, partition, window, then process the window's
/// still-pending items one at a time, checkpointing progress after every
/// transition. The window is carved out of the full id list, so `start`
/// positions are stable across runs as items complete.
/// `on_item(position, total, id, outcome)` is called after each item.
pub async fn run_batch<B, F>(
    backend: Arc<B>,
    cfg: &MillConfig,
    plan: &BatchPlan,
    mut on_item: F,
) -> Result<BatchSummary>
where
    B: ModelBackend + 'static,
    F: FnMut(usize, usize, &str, &ItemOutcome),
{
    fs::create_dir_all(&plan.output_dir).await?;
    let progress_path = plan.output_dir.join(PROGRESS_FILE);
    let initial = ProgressState::load(&progress_path).await?;

    let ids = if plan.retry_failed {
        initial.retryable()
    } else if let Some(list) = &plan.id_list {
        read_id_list(list).await?
    } else {
        list_items(&plan.input_dir, "txt").await?
    };
    let ids = assign_slot(&ids, plan.workers, plan.slot);
    let universe = ids.len();
    let ids = window(&ids, plan.start, plan.count);
    let ids = pending(ids, &initial, cfg.force);
    let items: Vec<WorkItem> = ids
        .into_iter()
        .map(|id| WorkItem {
            path: plan.input_dir.join(format!("{id}.txt")),
            id,
        })
        .collect();
    let total = items.len();

    let mut summary = BatchSummary {
        universe,
        ..BatchSummary::default()
    };
    for (position, item) in items.iter().enumerate() {
        if position > 0 && !cfg.item_delay.is_zero() {
            sleep(cfg.item_delay).await;
        }

        // A sibling slot may have finished or skipped this id since we
        // planned.
        let fresh = ProgressState::load(&progress_path).await?;
        if !cfg.force && (fresh.is_completed(&item.id) || fresh.is_skipped(&item.id)) {
            let outcome = ItemOutcome::SkippedCompleted;
            on_item(position, total, &item.id, &outcome);
            summary.push(item.id.clone(), outcome);
            continue;
        }

        let outcome = process_one(&backend, cfg, plan, item).await;
        match &outcome {
            ItemOutcome::Completed => {
                record(&progress_path, &item.id, true).await?;
            }
            ItemOutcome::Failed(_) => {
                record(&progress_path, &item.id, false).await?;
            }
            ItemOutcome::NoSourceText => {
                record_skipped(&progress_path, &item.id).await?;
            }
            ItemOutcome::SkippedCompleted => {}
        }
        on_item(position, total, &item.id, &outcome);
        summary.push(item.id.clone(), outcome);
    }

    Ok(summary)
}

/// Merge every parseable per-item JSON file into one combined array,
/// skipping documents that recorded an error. Returns the episode count.
pub async fn combine_results(json_dir: &Path, out_path: &Path) -> Result<usize> {
    let ids = match list_items(json_dir, "json").await {
        Ok(ids) => ids,
        // Nothing extracted yet.
        Err(MillError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };

    let mut all = Vec::new();
    for id in ids {
        let content = fs::read_to_string(json_dir.join(format!("{id}.json"))).await?;
        let Ok(value) = serde_json::from_str::<Value>(&content) else {
            continue;
        };
        if value.get("error").is_some() {
            continue;
        }
        all.push(value);
    }

    write_json_pretty(out_path, &all).await?;
    Ok(all.len())
}

/// Coverage audit of the translation output directory against the source
/// listing and the progress file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub total: usize,
    pub translated: usize,
    /// Document exists but holds no translated text.
    pub untranslated: Vec<String>,
    /// Source transcript with no document at all.
    pub missing: Vec<String>,
    /// Recorded as completed in the progress file, yet no translated
    /// document is on disk.
    pub inconsistent: Vec<String>,
}

/// Audit every source transcript against its per-episode document,
/// cross-checking the progress file for completed ids whose translation is
/// actually absent.
pub async fn verify_translations(input_dir: &Path, output_dir: &Path) -> Result<VerifyReport> {
    let ids = list_items(input_dir, "txt").await?;
    let progress = ProgressState::load(&output_dir.join(PROGRESS_FILE)).await?;

    let mut report = VerifyReport {
        total: ids.len(),
        ..VerifyReport::default()
    };
    for id in ids {
        let doc_path = output_dir.join(format!("{id}.json"));
        let translated = match fs::read_to_string(&doc_path).await {
            Ok(content) => serde_json::from_str::<TranscriptDoc>(&content)
                .ok()
                .and_then(|doc| doc.zh)
                .is_some_and(|zh| !zh.trim().is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if progress.is_completed(&id) {
                    report.inconsistent.push(id.clone());
                }
                report.missing.push(id);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if translated {
            report.translated += 1;
        } else {
            if progress.is_completed(&id) {
                report.inconsistent.push(id.clone());
            }
            report.untranslated.push(id);
        }
    }
    Ok(report)
}
