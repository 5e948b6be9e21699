/*!
 * Concurrent batch dispatch.
 *
 * Batches are submitted in order to a bounded pool of in-flight requests and
 * may complete in any order. Results are applied to the job by the single
 * consumer loop, so the job never needs a lock.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::batcher::Batch;
use super::checkpoint::Checkpoint;
use super::concurrency::clamp_workers;
use super::core::{BatchOutcome, TranslationService};
use super::job::TranslationJob;
use super::prompts::Segment;

/// How the dispatch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every batch was translated or exhausted its retries
    Completed,
    /// The failed-batch ceiling was crossed and the remaining batches were cancelled
    Aborted { failed: usize, limit: usize },
}

/// Batch translator dispatching batches across a bounded worker pool
pub struct BatchTranslator {
    /// The translation service to use
    service: TranslationService,

    /// Maximum number of batches in flight
    max_workers: usize,
}

impl BatchTranslator {
    /// Create a new batch translator
    pub fn new(service: TranslationService, max_workers: usize) -> Self {
        Self {
            service,
            max_workers: clamp_workers(max_workers),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Translate every batch of the job.
    ///
    /// Batches already in the checkpoint are applied without a request. A
    /// failed batch only fails its own atoms; once the job's failure ceiling
    /// is crossed, batches that have not been sent yet are cancelled and the
    /// ones in flight are drained.
    pub async fn translate_batches(
        &self,
        job: &mut TranslationJob,
        batches: &[Batch],
        checkpoint: Option<&Checkpoint>,
        progress_callback: impl Fn(usize, usize),
    ) -> DispatchOutcome {
        let total_batches = batches.len();
        job.batches_total = total_batches;
        let mut processed = 0;

        let mut pending = Vec::with_capacity(total_batches);
        for batch in batches {
            let segments = job.segments(batch);
            let key = Checkpoint::key(&job.settings.target_language, &job.settings.model, &segments);

            let resumed = checkpoint
                .and_then(|cp| cp.get(&key))
                .filter(|translations| same_ids(translations, &segments));
            match resumed {
                Some(translations) => {
                    job.record_success(batch, translations);
                    job.checkpoint_hits += 1;
                    processed += 1;
                    progress_callback(processed, total_batches);
                }
                None => {
                    job.begin_batch(batch);
                    pending.push((batch.clone(), segments, key));
                }
            }
        }

        if job.checkpoint_hits > 0 {
            info!("Resumed {} of {} batches from checkpoint", job.checkpoint_hits, total_batches);
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let target_language = job.settings.target_language.clone();

        let mut results = stream::iter(pending)
            .map(|(batch, segments, key)| {
                let service = self.service.clone();
                let cancelled = cancelled.clone();
                let target_language = target_language.clone();

                async move {
                    if cancelled.load(Ordering::SeqCst) {
                        return (batch, key, None);
                    }
                    debug!("Sending batch {} ({} atoms, {} chars)", batch.index + 1, batch.len(), batch.chars);
                    let outcome = service.translate_batch(&target_language, &segments).await;
                    (batch, key, Some(outcome))
                }
            })
            .buffer_unordered(self.max_workers);

        while let Some((batch, key, outcome)) = results.next().await {
            match outcome {
                None => job.record_cancelled(&batch),
                Some(BatchOutcome::Translated { translations, attempts }) => {
                    if attempts > 1 {
                        debug!("Batch {} succeeded after {} attempts", batch.index + 1, attempts);
                    }
                    if let Some(checkpoint) = checkpoint {
                        if let Err(e) = checkpoint.append(&key, batch.index, &translations) {
                            warn!("Failed to record batch {} in checkpoint: {}", batch.index + 1, e);
                        }
                    }
                    job.record_success(&batch, translations);
                }
                Some(BatchOutcome::Failed { error, attempts }) => {
                    error!(
                        "Batch {} of {} failed after {} attempts: {}",
                        batch.index + 1,
                        total_batches,
                        attempts,
                        error
                    );
                    job.record_failure(&batch, attempts, &error);
                }
            }

            processed += 1;
            progress_callback(processed, total_batches);

            if job.ceiling_exceeded() && !cancelled.swap(true, Ordering::SeqCst) {
                warn!(
                    "{} failed batches exceed the limit, cancelling the remaining batches",
                    job.failures.len()
                );
            }
        }

        match job.settings.max_failed_batches {
            Some(limit) if job.ceiling_exceeded() => DispatchOutcome::Aborted {
                failed: job.failures.len(),
                limit,
            },
            _ => DispatchOutcome::Completed,
        }
    }
}

/// A checkpoint entry only applies if it answers exactly these ids
fn same_ids(translations: &[Segment], segments: &[Segment]) -> bool {
    translations.len() == segments.len()
        && translations.iter().zip(segments).all(|(t, s)| t.id == s.id)
}
