/*!
 * Book translation through AI providers.
 *
 * - `atom`: the translatable unit and its status
 * - `batcher`: groups atoms under a character budget
 * - `prompts`: prompt templates and the JSON wire protocol
 * - `core`: translation service, retry policy and provider dispatch
 * - `concurrency`: worker limits per provider
 * - `batch`: bounded concurrent dispatch of batches
 * - `job`: run state and failure ledger
 * - `checkpoint`: resumable batch results
 * - `preview`: prefix runs and the audit table
 * - `probe`: pre-flight provider check
 */

// Re-export main types for easier usage
pub use self::atom::{Atom, AtomStatus, Locator};
pub use self::batch::{BatchTranslator, DispatchOutcome};
pub use self::batcher::{Batch, plan_batches};
pub use self::checkpoint::Checkpoint;
pub use self::concurrency::{MAX_WORKERS, MIN_WORKERS, ProviderProfile};
pub use self::core::{BatchOutcome, RetryPolicy, TranslationService};
pub use self::job::{BatchFailure, JobSettings, JobSummary, TranslationJob};
pub use self::preview::PreviewController;
pub use self::probe::{CapabilityProbe, ProbeReport};
pub use self::prompts::{PromptTemplate, Segment, TranslationPromptBuilder};

// Submodules
pub mod atom;
pub mod batch;
pub mod batcher;
pub mod checkpoint;
pub mod concurrency;
pub mod core;
pub mod job;
pub mod preview;
pub mod probe;
pub mod prompts;
