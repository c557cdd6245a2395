//! Insightmill Core Library
//!
//! Resumable batch driver for transforming podcast transcripts with a
//! remote language model: methodology extraction and EN -> ZH translation,
//! with chunking, retry and a checkpointed progress file.

pub mod batch;
pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod progress;
pub mod prompt;
pub mod source;
pub mod types;

// Re-export commonly used items at crate root
pub use batch::{
    BatchPlan, TaskKind, VerifyReport, combine_results, extract_item, run_batch, translate_item,
    verify_translations,
};
pub use chunk::{Chunker, split_chunks};
pub use client::{HttpBackend, ModelBackend, with_retries};
pub use config::{MillConfig, ModelProvider, RetryPolicy, WireFormat};
pub use error::{MillError, Result};
pub use extract::extract_json;
pub use progress::{PROGRESS_FILE, ProgressState, record, record_skipped};
pub use source::{assign_slot, list_items, pending, read_id_list, window};
pub use types::{BatchSummary, ItemOutcome, TranscriptDoc, WorkItem};
