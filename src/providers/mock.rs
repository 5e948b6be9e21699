/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockProvider::working()` - Always succeeds with translated segments
 * - `MockProvider::dropping_one()` - Leaves out the last segment of each batch
 * - `MockProvider::failing()` - Always fails with a server error
 * - `MockProvider::unauthorized()` - Rejects the credentials
 * - `MockProvider::rate_limited(n)` - Throttles the first `n` requests
 * - `MockProvider::slow(ms)` - Succeeds after a delay, to observe concurrency
 * - `MockProvider::malformed()` - Answers with prose instead of JSON
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::Provider;
use crate::translation::prompts::Segment;

/// Mock request for testing
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub system: String,
    pub user: String,
}

/// Mock response for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Returns one translation fewer than requested
    DropOne,
    /// Always fails with an error
    Failing,
    /// Fails with an authentication error
    Unauthorized,
    /// Rate-limits the first `failures` requests, then works
    RateLimited { failures: usize },
    /// Simulates slow response
    Slow { delay_ms: u64 },
    /// Replies with text that is not JSON
    Malformed,
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    /// Requests started
    request_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    /// Every request received, in arrival order
    requests: Arc<Mutex<Vec<MockRequest>>>,
    /// Per-segment translation override
    translator: Option<fn(&str, &str) -> String>,
}

/// Decrements the in-flight counter when a request finishes
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            translator: None,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn dropping_one() -> Self {
        Self::new(MockBehavior::DropOne)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn unauthorized() -> Self {
        Self::new(MockBehavior::Unauthorized)
    }

    pub fn rate_limited(failures: usize) -> Self {
        Self::new(MockBehavior::RateLimited { failures })
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn malformed() -> Self {
        Self::new(MockBehavior::Malformed)
    }

    /// Translate each segment with `translator(text, target_language)`
    pub fn with_translator(mut self, translator: fn(&str, &str) -> String) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Copy of every request received
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    /// Default translation: tag the text with the target language
    pub fn default_translation(text: &str, target_language: &str) -> String {
        format!("[{}] {}", target_language, text)
    }

    fn translate(&self, text: &str, target_language: &str) -> String {
        let translator = self.translator.unwrap_or(Self::default_translation);
        translator(text, target_language)
    }

    /// Build a reply for a request, dropping `drop` trailing segments
    fn reply(&self, request: &MockRequest, drop: usize) -> String {
        let Some((target_language, segments)) = parse_request(&request.user) else {
            // probe or other free-form prompt
            let line = request.user.lines().last().unwrap_or_default();
            return self.translate(line, "?");
        };

        let keep = segments.len().saturating_sub(drop);
        let translations: Vec<Segment> = segments
            .into_iter()
            .take(keep)
            .map(|s| Segment {
                id: s.id,
                text: self.translate(&s.text, &target_language),
            })
            .collect();
        serde_json::json!({ "translations": translations }).to_string()
    }
}

/// Pull the target language and segments out of a batch user prompt
fn parse_request(user: &str) -> Option<(String, Vec<Segment>)> {
    let start = user.find('{')?;
    let value: Value = serde_json::from_str(&user[start..]).ok()?;
    let target_language = value.get("target_language")?.as_str()?.to_string();
    let segments = serde_json::from_value(value.get("segments")?.clone()).ok()?;
    Some((target_language, segments))
}

#[async_trait]
impl Provider for MockProvider {
    type Request = MockRequest;
    type Response = MockResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);
        self.requests.lock().push(request.clone());

        let text = match self.behavior {
            MockBehavior::Working => self.reply(&request, 0),

            MockBehavior::DropOne => self.reply(&request, 1),

            MockBehavior::Failing => {
                return Err(ProviderError::ApiError {
                    message: "Simulated provider failure".to_string(),
                    status_code: 500,
                });
            }

            MockBehavior::Unauthorized => {
                return Err(ProviderError::AuthenticationError("Simulated invalid API key".to_string()));
            }

            MockBehavior::RateLimited { failures } => {
                if count < failures {
                    return Err(ProviderError::RateLimitExceeded {
                        message: format!("Simulated rate limit (request #{})", count + 1),
                        retry_after: Some(Duration::from_millis(1)),
                    });
                }
                self.reply(&request, 0)
            }

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                self.reply(&request, 0)
            }

            MockBehavior::Malformed => "I'm sorry, here is the translation: Bonjour".to_string(),
        };

        Ok(MockResponse { text })
    }

    fn extract_text(response: &Self::Response) -> String {
        response.text.clone()
    }
}
