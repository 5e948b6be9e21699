/*!
 * Core translation service implementation.
 *
 * This module contains the main TranslationService struct, which sends one
 * batch of segments to the configured provider, validates the reply and
 * retries with exponential backoff.
 */

use anyhow::{Result, anyhow};
use log::{debug, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::prompts::{PromptTemplate, Segment, TranslationPromptBuilder, parse_batch_response};
use crate::app_config::{TranslationConfig, TranslationProvider as ConfigTranslationProvider};
use crate::errors::{ProviderError, TranslationError};
use crate::providers::Provider;
use crate::providers::anthropic::{Anthropic, AnthropicRequest};
use crate::providers::mock::{MockProvider, MockRequest};
use crate::providers::ollama::{ChatRequest, Ollama};
use crate::providers::openai::{OpenAI, OpenAIRequest};

/// Anthropic requires an explicit completion cap
const DEFAULT_ANTHROPIC_MAX_TOKENS: u32 = 8192;

/// Shape of the reply a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyFormat {
    Text,
    Json,
}

/// Translation provider implementation variants
#[derive(Debug)]
enum TranslationProviderImpl {
    /// OpenAI API service
    OpenAI { client: OpenAI },

    /// LM Studio local server (OpenAI-compatible)
    LMStudio { client: OpenAI },

    /// Anthropic API service
    Anthropic { client: Anthropic },

    /// Ollama LLM service
    Ollama { client: Ollama },

    /// Scripted provider
    Mock { client: MockProvider },
}

/// Retry and backoff settings for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per batch, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Applied to the delay when the provider rate-limits us
    pub rate_limit_multiplier: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &TranslationConfig) -> Self {
        Self {
            max_attempts: config.common.retry_count.max(1),
            base_delay: Duration::from_millis(config.common.retry_backoff_ms),
            max_delay: Duration::from_millis(config.common.max_backoff_ms),
            rate_limit_multiplier: config.common.rate_limit_backoff_multiplier.max(1),
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based), without jitter.
    ///
    /// Exponential from `base_delay`, capped at `max_delay`. A rate limit
    /// multiplies the delay and raises the cap by the same factor, and never
    /// waits less than the server's `Retry-After`.
    pub fn backoff_delay(&self, attempt: u32, error: &TranslationError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay.saturating_mul(1u32 << exponent);

        if !error.is_rate_limit() {
            return exponential.min(self.max_delay);
        }

        let cap = self.max_delay.saturating_mul(self.rate_limit_multiplier);
        let mut delay = exponential.saturating_mul(self.rate_limit_multiplier);
        if let TranslationError::Provider(provider_error) = error {
            if let Some(retry_after) = provider_error.retry_after() {
                delay = delay.max(retry_after);
            }
        }
        delay.min(cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TranslationConfig::default())
    }
}

/// Result of sending one batch, retries included
#[derive(Debug)]
pub enum BatchOutcome {
    Translated {
        translations: Vec<Segment>,
        attempts: u32,
    },
    Failed {
        error: TranslationError,
        attempts: u32,
    },
}

/// Main translation service for book translation
#[derive(Debug, Clone)]
pub struct TranslationService {
    /// Provider implementation
    provider: Arc<TranslationProviderImpl>,

    /// Configuration for the translation service
    pub config: TranslationConfig,

    pub retry: RetryPolicy,
}

impl TranslationService {
    /// Create a new translation service with the given configuration
    pub fn new(config: TranslationConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.get_timeout_secs());
        let provider = match config.provider {
            ConfigTranslationProvider::OpenAI => {
                let api_key = config.get_api_key();
                if api_key.is_empty() {
                    return Err(anyhow!("Translation API key is required for OpenAI provider"));
                }
                TranslationProviderImpl::OpenAI {
                    client: OpenAI::new(api_key, config.get_endpoint(), timeout),
                }
            }
            ConfigTranslationProvider::LMStudio => TranslationProviderImpl::LMStudio {
                // LM Studio accepts any key
                client: OpenAI::with_label(
                    "LM Studio",
                    config.get_api_key(),
                    config.get_endpoint(),
                    timeout,
                ),
            },
            ConfigTranslationProvider::Anthropic => {
                let api_key = config.get_api_key();
                if api_key.is_empty() {
                    return Err(anyhow!("Translation API key is required for Anthropic provider"));
                }
                TranslationProviderImpl::Anthropic {
                    client: Anthropic::new(api_key, config.get_endpoint(), timeout),
                }
            }
            ConfigTranslationProvider::Ollama => TranslationProviderImpl::Ollama {
                client: Ollama::new(config.get_endpoint(), timeout),
            },
        };

        let retry = RetryPolicy::from_config(&config);
        Ok(Self {
            provider: Arc::new(provider),
            config,
            retry,
        })
    }

    /// Service backed by a mock provider
    pub fn with_mock(client: MockProvider, config: TranslationConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            provider: Arc::new(TranslationProviderImpl::Mock { client }),
            config,
            retry,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Name of the backend, for logs and the probe report
    pub fn provider_name(&self) -> &'static str {
        match self.provider.as_ref() {
            TranslationProviderImpl::Mock { .. } => "Mock",
            _ => self.config.provider.display_name(),
        }
    }

    pub fn model(&self) -> String {
        self.config.get_model()
    }

    /// One chat completion: a single attempt, no retries
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        self.send(system, user, ReplyFormat::Text).await
    }

    async fn send(&self, system: &str, user: &str, format: ReplyFormat) -> Result<String, ProviderError> {
        let model = self.config.get_model();
        let temperature = self.config.common.temperature;
        let max_tokens = self.config.get_max_tokens();

        match self.provider.as_ref() {
            TranslationProviderImpl::OpenAI { client } | TranslationProviderImpl::LMStudio { client } => {
                let request = OpenAIRequest::new(model)
                    .add_message("system", system)
                    .add_message("user", user)
                    .temperature(temperature)
                    .max_tokens(max_tokens);
                let response = client.complete(request).await?;
                Ok(OpenAI::extract_text(&response))
            }
            TranslationProviderImpl::Anthropic { client } => {
                let request = AnthropicRequest::new(model, max_tokens.unwrap_or(DEFAULT_ANTHROPIC_MAX_TOKENS))
                    .system(system)
                    .add_message("user", user)
                    .temperature(temperature);
                let response = client.complete(request).await?;
                Ok(Anthropic::extract_text(&response))
            }
            TranslationProviderImpl::Ollama { client } => {
                let request = self.ollama_request(system, user, format);
                let response = client.complete(request).await?;
                Ok(Ollama::extract_text(&response))
            }
            TranslationProviderImpl::Mock { client } => {
                let request = MockRequest {
                    system: system.to_string(),
                    user: user.to_string(),
                };
                let response = client.complete(request).await?;
                Ok(MockProvider::extract_text(&response))
            }
        }
    }

    fn ollama_request(&self, system: &str, user: &str, format: ReplyFormat) -> ChatRequest {
        let request = ChatRequest::new(self.config.get_model())
            .add_message("system", system)
            .add_message("user", user)
            .temperature(self.config.common.temperature)
            .max_tokens(self.config.get_max_tokens());
        match format {
            ReplyFormat::Json => request.json_format(),
            ReplyFormat::Text => request,
        }
    }

    fn prompt_builder(&self, target_language: &str) -> TranslationPromptBuilder {
        TranslationPromptBuilder::new(
            PromptTemplate::new(&self.config.common.system_prompt),
            target_language,
        )
    }

    /// Send a batch once and validate the reply
    pub async fn translate_once(
        &self,
        target_language: &str,
        segments: &[Segment],
    ) -> Result<Vec<Segment>, TranslationError> {
        let (system, user) = self.prompt_builder(target_language).build(segments);
        let reply = self.send(&system, &user, ReplyFormat::Json).await?;
        parse_batch_response(&reply, segments)
    }

    /// Send a batch, retrying transport, rate-limit and validation failures.
    ///
    /// Every attempt resends the same segments. Errors that cannot succeed on
    /// a retry (authentication, client errors) end the batch immediately.
    pub async fn translate_batch(&self, target_language: &str, segments: &[Segment]) -> BatchOutcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            match self.translate_once(target_language, segments).await {
                Ok(translations) => {
                    debug!(
                        "Batch of {} segments translated in {:?} (attempt {})",
                        segments.len(),
                        started.elapsed(),
                        attempt
                    );
                    return BatchOutcome::Translated {
                        translations,
                        attempts: attempt,
                    };
                }
                Err(error) if !error.is_retryable() || attempt >= self.retry.max_attempts => {
                    return BatchOutcome::Failed {
                        error,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    let delay = self.retry.backoff_delay(attempt, &error);
                    let jitter = jitter(delay);
                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        self.retry.max_attempts,
                        error,
                        delay + jitter
                    );
                    tokio::time::sleep(delay + jitter).await;
                }
            }
        }
    }
}

/// Up to 20% random extra delay
fn jitter(delay: Duration) -> Duration {
    let max_ms = (delay.as_millis() / 5) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
