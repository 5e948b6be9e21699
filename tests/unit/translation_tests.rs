/*!
 * Tests for the translation service, checkpoint and worker limits through the public API
 */

use anyhow::Result;
use std::fs;
use std::io::Write;

use bookwai::app_config::{TranslationConfig, TranslationProvider};
use bookwai::TranslationError;
use bookwai::providers::mock::MockProvider;
use bookwai::translation::{
    BatchOutcome, Checkpoint, MAX_WORKERS, ProviderProfile, Segment, TranslationService,
};

use crate::common;

fn segments() -> Vec<Segment> {
    vec![
        Segment { id: 7, text: "Hello".to_string() },
        Segment { id: 8, text: "Goodbye".to_string() },
    ]
}

fn service(mock: MockProvider) -> TranslationService {
    TranslationService::with_mock(mock, TranslationConfig::default()).with_retry_policy(common::fast_retry())
}

#[tokio::test]
async fn test_translate_batch_should_send_ids_and_language() {
    let mock = MockProvider::working();
    let outcome = service(mock.clone()).translate_batch("ja", &segments()).await;

    match outcome {
        BatchOutcome::Translated { translations, attempts } => {
            assert_eq!(attempts, 1);
            assert_eq!(translations[0], Segment { id: 7, text: "[ja] Hello".to_string() });
            assert_eq!(translations[1].id, 8);
        }
        BatchOutcome::Failed { error, .. } => panic!("unexpected failure: {}", error),
    }

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].system.contains("ja"));
    assert!(!requests[0].system.contains("{target_language}"));
    assert!(requests[0].user.contains("\"id\": 7"));
    assert!(requests[0].user.contains("\"target_language\": \"ja\""));
}

#[tokio::test]
async fn test_translate_batch_should_resend_identical_batch_on_retry() {
    let mock = MockProvider::rate_limited(1);
    let outcome = service(mock.clone()).translate_batch("ja", &segments()).await;

    assert!(matches!(outcome, BatchOutcome::Translated { attempts: 2, .. }));
    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].user, requests[1].user);
}

#[tokio::test]
async fn test_translate_batch_with_unparseable_reply_should_fail_after_all_attempts() {
    let mock = MockProvider::malformed();
    let outcome = service(mock.clone()).translate_batch("ja", &segments()).await;

    match outcome {
        BatchOutcome::Failed { error, attempts } => {
            assert_eq!(attempts, common::fast_retry().max_attempts);
            assert!(matches!(error, TranslationError::MalformedResponse(_)));
        }
        BatchOutcome::Translated { .. } => panic!("malformed replies must not succeed"),
    }
}

#[test]
fn test_checkpoint_key_should_depend_on_language_model_and_text() {
    let base = Checkpoint::key("fr", "gpt-5", &segments());
    assert_eq!(base, Checkpoint::key("fr", "gpt-5", &segments()));
    assert_ne!(base, Checkpoint::key("de", "gpt-5", &segments()));
    assert_ne!(base, Checkpoint::key("fr", "llama3.2:3b", &segments()));

    let mut edited = segments();
    edited[1].text = "Good night".to_string();
    assert_ne!(base, Checkpoint::key("fr", "gpt-5", &edited));
}

#[test]
fn test_checkpoint_should_reload_and_skip_damaged_lines() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("book.fr.checkpoint.jsonl");
    let key = Checkpoint::key("fr", "gpt-5", &segments());

    let checkpoint = Checkpoint::open(&path)?;
    assert!(checkpoint.is_empty());
    checkpoint.append(&key, 0, &segments())?;

    // an interrupted write leaves half a line behind
    let mut file = fs::OpenOptions::new().append(true).open(&path)?;
    write!(file, "{{\"key\":\"trunc")?;
    drop(file);

    let reopened = Checkpoint::open(&path)?;
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.get(&key), Some(segments()));
    assert_eq!(reopened.get("missing"), None);
    assert_eq!(reopened.hits(), 1);

    reopened.remove()?;
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_provider_profile_should_clamp_worker_overrides() {
    let profile = ProviderProfile::for_provider(TranslationProvider::Anthropic);
    assert_eq!(profile.effective_workers(None), 5);
    assert_eq!(profile.effective_workers(Some(0)), 1);
    assert_eq!(profile.effective_workers(Some(100)), MAX_WORKERS);
}
