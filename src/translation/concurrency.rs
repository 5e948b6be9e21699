/*!
 * Provider-specific concurrency tuning.
 *
 * Default worker counts per backend, and the clamp that keeps every
 * configured worker count within the supported range.
 */

use log::warn;

use crate::app_config::TranslationProvider;

/// Lowest supported worker count
pub const MIN_WORKERS: usize = 1;

/// Highest supported worker count
pub const MAX_WORKERS: usize = 25;

/// Provider-specific concurrency profile with tuned defaults
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Batches in flight when the user does not choose
    pub max_concurrent_requests: usize,
}

impl ProviderProfile {
    /// Get the profile for a given provider
    pub fn for_provider(provider: TranslationProvider) -> Self {
        match provider {
            TranslationProvider::OpenAI => Self {
                max_concurrent_requests: 10,
            },
            // lower rate limits
            TranslationProvider::Anthropic => Self {
                max_concurrent_requests: 5,
            },
            // local models are bound by one GPU
            TranslationProvider::Ollama => Self {
                max_concurrent_requests: 4,
            },
            TranslationProvider::LMStudio => Self {
                max_concurrent_requests: 4,
            },
        }
    }

    /// Worker count for a run, honouring a user override and the supported range
    pub fn effective_workers(&self, user_override: Option<usize>) -> usize {
        clamp_workers(user_override.unwrap_or(self.max_concurrent_requests))
    }
}

/// Keep a worker count within `MIN_WORKERS..=MAX_WORKERS`
pub fn clamp_workers(requested: usize) -> usize {
    let clamped = requested.clamp(MIN_WORKERS, MAX_WORKERS);
    if clamped != requested {
        warn!(
            "Worker count {} is outside {}-{}, using {}",
            requested, MIN_WORKERS, MAX_WORKERS, clamped
        );
    }
    clamped
}
