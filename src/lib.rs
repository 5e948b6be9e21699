/*!
 * # bookwai - translate EPUB books with AI
 *
 * Extracts the translatable text of an EPUB, sends it in batches to an AI
 * provider and writes a translated copy that keeps every byte of markup it
 * did not translate.
 *
 * ## Features
 *
 * - EPUB input, plus MOBI/AZW through Calibre's `ebook-convert`
 * - Translation through various AI providers:
 *   - OpenAI API and LM Studio (OpenAI-compatible)
 *   - Anthropic API
 *   - Ollama (local LLM)
 * - Bounded concurrent batches with retry and backoff
 * - Resumable runs through a checkpoint file
 * - Preview runs over the first N atoms with an audit table
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `app_controller`: Main application controller
 * - `converter`: External format conversion
 * - `epub`: Container model, extraction, reinjection and repackaging
 * - `translation`: Batching, dispatch and job state
 * - `providers`: Client implementations for various LLM providers
 * - `file_utils`: File system operations and output naming
 * - `language_utils`: Language tag utilities
 * - `errors`: Custom error types for the application
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod converter;
pub mod epub;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{Controller, RunOutcome};
pub use errors::{AppError, ContainerError, MarkupError, ProviderError, TranslationError};
pub use translation::TranslationService;
