/*!
 * Tests for configuration loading, defaults and validation
 */

use anyhow::Result;
use std::fs;
use std::str::FromStr;

use bookwai::app_config::{Config, LogLevel, TranslationProvider};
use tempfile::TempDir;

#[test]
fn test_load_or_create_with_missing_file_should_write_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested").join("bookwai.json");

    let config = Config::load_or_create(&path)?;
    assert!(path.exists());
    assert_eq!(config.target_language, "zh-TW");
    assert_eq!(config.book.max_chars_per_call, 3500);
    assert_eq!(config.translation.common.retry_count, 7);

    let reloaded = Config::load_or_create(&path)?;
    assert_eq!(reloaded.translation.available_providers.len(), 4);
    Ok(())
}

#[test]
fn test_load_or_create_with_partial_file_should_fill_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("conf.json");
    fs::write(
        &path,
        r#"{
            "target_language": "fr",
            "translation": { "provider": "ollama", "available_providers": [ { "type": "ollama", "model": "qwen2.5:7b" } ] },
            "book": { "preview_limit": 25, "max_workers": 3 },
            "log_level": "debug"
        }"#,
    )?;

    let config = Config::load_or_create(&path)?;
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.get_model(), "qwen2.5:7b");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:11434");
    assert_eq!(config.translation.get_timeout_secs(), 120);
    assert_eq!(config.book.preview_limit, 25);
    assert_eq!(config.book.max_workers, Some(3));
    assert!(config.book.translate_alt_text);
    assert!(config.book.resume);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate().is_ok());
    Ok(())
}

#[test]
fn test_validate_should_reject_bad_language_and_budget() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Ollama;
    assert!(config.validate().is_ok());

    config.target_language = "klingon".to_string();
    assert!(config.validate().is_err());

    config.target_language = "pt-BR".to_string();
    config.book.max_chars_per_call = 0;
    assert!(config.validate().is_err());

    config.book.max_chars_per_call = 100;
    config.translation.common.retry_count = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_should_accept_configured_api_key() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Anthropic;
    config.set_api_key("sk-ant-test");
    assert!(config.validate().is_ok());
    assert_eq!(config.translation.get_api_key(), "sk-ant-test");
}

#[test]
fn test_set_model_should_add_missing_provider_entry() {
    let mut config = Config::default();
    config.translation.available_providers.clear();
    config.translation.provider = TranslationProvider::LMStudio;

    config.set_model("mistral-7b-instruct");

    assert_eq!(config.translation.available_providers.len(), 1);
    assert_eq!(config.translation.get_model(), "mistral-7b-instruct");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:1234/v1");
}

#[test]
fn test_provider_names_should_round_trip() -> Result<()> {
    for provider in [
        TranslationProvider::OpenAI,
        TranslationProvider::Anthropic,
        TranslationProvider::Ollama,
        TranslationProvider::LMStudio,
    ] {
        assert_eq!(TranslationProvider::from_str(&provider.to_string())?, provider);
    }
    assert!(TranslationProvider::from_str("gemini").is_err());
    assert_eq!(TranslationProvider::LMStudio.display_name(), "LM Studio");
    Ok(())
}
