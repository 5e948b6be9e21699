/*!
 * Run state for one translation job.
 *
 * The job owns the atom list and the failure ledger. Only the dispatcher's
 * consumer loop mutates it, one completed batch at a time.
 */

use std::fmt;
use std::time::{Duration, Instant};

use uuid::Uuid;

use super::atom::{Atom, AtomStatus};
use super::batcher::Batch;
use super::core::RetryPolicy;
use super::prompts::Segment;
use crate::errors::TranslationError;

/// Fixed parameters of a run
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub target_language: String,
    pub model: String,
    pub max_workers: usize,
    pub max_chars_per_call: usize,
    pub retry: RetryPolicy,
    /// Atom ceiling when previewing
    pub preview_limit: Option<usize>,
    /// Abort once more batches than this have failed
    pub max_failed_batches: Option<usize>,
}

/// A batch that exhausted its attempts
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub batch: usize,
    pub first_id: usize,
    pub last_id: usize,
    pub attempts: u32,
    pub error: String,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {} (atoms {}-{}) failed after {} attempts: {}",
            self.batch + 1,
            self.first_id,
            self.last_id,
            self.attempts,
            self.error
        )
    }
}

/// Process-wide state of one invocation
#[derive(Debug)]
pub struct TranslationJob {
    pub run_id: Uuid,
    pub settings: JobSettings,
    pub atoms: Vec<Atom>,
    pub failures: Vec<BatchFailure>,
    pub batches_total: usize,
    pub batches_translated: usize,
    pub batches_cancelled: usize,
    pub checkpoint_hits: usize,
    started: Instant,
}

impl TranslationJob {
    pub fn new(settings: JobSettings, atoms: Vec<Atom>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            settings,
            atoms,
            failures: Vec::new(),
            batches_total: 0,
            batches_translated: 0,
            batches_cancelled: 0,
            checkpoint_hits: 0,
            started: Instant::now(),
        }
    }

    /// Request payload of a batch: ids and trimmed source text
    pub fn segments(&self, batch: &Batch) -> Vec<Segment> {
        self.atoms[batch.atoms.clone()]
            .iter()
            .map(|atom| Segment {
                id: atom.id,
                text: atom.core_text().to_string(),
            })
            .collect()
    }

    pub fn begin_batch(&mut self, batch: &Batch) {
        for atom in &mut self.atoms[batch.atoms.clone()] {
            atom.mark_in_batch();
        }
    }

    /// Store validated translations; they arrive in request order
    pub fn record_success(&mut self, batch: &Batch, translations: Vec<Segment>) {
        for (atom, segment) in self.atoms[batch.atoms.clone()].iter_mut().zip(translations) {
            debug_assert_eq!(atom.id, segment.id);
            atom.mark_translated(segment.text);
        }
        self.batches_translated += 1;
    }

    /// Every atom of the batch keeps its source text
    pub fn record_failure(&mut self, batch: &Batch, attempts: u32, error: &TranslationError) {
        let atoms = &mut self.atoms[batch.atoms.clone()];
        for atom in atoms.iter_mut() {
            atom.mark_failed();
        }
        self.failures.push(BatchFailure {
            batch: batch.index,
            first_id: atoms.first().map(|a| a.id).unwrap_or_default(),
            last_id: atoms.last().map(|a| a.id).unwrap_or_default(),
            attempts,
            error: error.to_string(),
        });
    }

    /// The batch was never sent
    pub fn record_cancelled(&mut self, batch: &Batch) {
        for atom in &mut self.atoms[batch.atoms.clone()] {
            atom.release();
        }
        self.batches_cancelled += 1;
    }

    /// Whether the failure ceiling has been crossed
    pub fn ceiling_exceeded(&self) -> bool {
        self.settings
            .max_failed_batches
            .is_some_and(|limit| self.failures.len() > limit)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.batches_cancelled == 0
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn summary(&self, documents: usize) -> JobSummary {
        let count = |status: AtomStatus| self.atoms.iter().filter(|a| a.status == status).count();
        JobSummary {
            documents,
            atoms: self.atoms.len(),
            batches: self.batches_total,
            translated: count(AtomStatus::Translated),
            failed: count(AtomStatus::Failed),
            untouched: count(AtomStatus::Pending) + count(AtomStatus::InBatch),
            failed_batches: self.failures.len(),
            cancelled_batches: self.batches_cancelled,
            checkpoint_hits: self.checkpoint_hits,
            elapsed: self.elapsed(),
        }
    }
}

/// End-of-run counts
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub documents: usize,
    pub atoms: usize,
    pub batches: usize,
    pub translated: usize,
    pub failed: usize,
    pub untouched: usize,
    pub failed_batches: usize,
    pub cancelled_batches: usize,
    pub checkpoint_hits: usize,
    pub elapsed: Duration,
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents, {} atoms in {} batches: {} translated, {} failed, {} untouched; \
             {} failed batches, {} cancelled, {} from checkpoint; {:.1}s",
            self.documents,
            self.atoms,
            self.batches,
            self.translated,
            self.failed,
            self.untouched,
            self.failed_batches,
            self.cancelled_batches,
            self.checkpoint_hits,
            self.elapsed.as_secs_f64()
        )
    }
}
