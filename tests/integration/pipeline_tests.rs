/*!
 * End-to-end runs of the controller against a sample EPUB and mock providers
 */

use anyhow::Result;
use std::fs;
use zip::CompressionMethod;

use bookwai::providers::mock::MockProvider;
use bookwai::translation::ProbeReport;
use bookwai::{AppError, RunOutcome};

use crate::common::{self, CHAPTER_ONE, CHAPTER_ONE_PATH, CHAPTER_TWO, CHAPTER_TWO_PATH, SampleBook};

fn hello_goodbye(text: &str, _target_language: &str) -> String {
    match text {
        "Hello" => "你好".to_string(),
        "Goodbye" => "再見".to_string(),
        other => format!("[{}]", other),
    }
}

fn completed(outcome: RunOutcome) -> bookwai::translation::JobSummary {
    match outcome {
        RunOutcome::Completed { summary, .. } => summary,
        RunOutcome::Skipped(path) => panic!("run was skipped: {:?}", path),
    }
}

#[tokio::test]
async fn test_run_with_working_provider_should_substitute_exact_text() -> Result<()> {
    common::init_logging();
    let book = SampleBook::new()?;
    let mock = MockProvider::working().with_translator(hello_goodbye);
    let controller = common::mock_controller(common::test_config(), mock);

    let summary = completed(controller.run(book.path.clone(), book.output_dir(), false).await?);
    assert_eq!(summary.atoms, 6);
    assert_eq!(summary.translated, 6);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.documents, 2);

    let output = book.output("zh-TW.translated.epub");
    let chapter_one = common::read_entry_string(&output, CHAPTER_ONE_PATH)?;
    let expected = CHAPTER_ONE
        .replace("<h1>Hello</h1>", "<h1>你好</h1>")
        .replace(">Goodbye<", ">再見<");
    assert_eq!(chapter_one, expected);

    // whitespace framing stays outside the translated core
    let chapter_two = common::read_entry_string(&output, CHAPTER_TWO_PATH)?;
    assert!(chapter_two.contains("<p>[It was a] <em>[dark]</em> [night.]</p>"));
    assert!(chapter_two.contains("alt=\"[A lighthouse]\""));
    assert!(chapter_two.contains("<title>Chapter Two</title>"));
    assert!(chapter_two.contains("<style>p { margin: 0 }</style>"));

    // clean full run leaves no checkpoint behind
    assert!(!book.output("zh-TW.checkpoint.jsonl").exists());
    assert!(!book.output("zh-TW.issues.log").exists());

    let report: ProbeReport = serde_json::from_str(&fs::read_to_string(book.output("zh-TW.api-selftest.json"))?)?;
    assert!(report.ok);
    assert_eq!(report.target_language, "zh-TW");
    Ok(())
}

#[tokio::test]
async fn test_run_should_copy_resources_verbatim_with_mimetype_first() -> Result<()> {
    let book = SampleBook::new()?;
    let controller = common::mock_controller(common::test_config(), MockProvider::working());
    controller.run(book.path.clone(), book.output_dir(), false).await?;

    let source = common::read_zip(&book.path)?;
    let output = common::read_zip(&book.output("zh-TW.translated.epub"))?;

    assert_eq!(output[0].name, "mimetype");
    assert_eq!(output[0].method, CompressionMethod::Stored);
    assert_eq!(output[0].data, b"application/epub+zip");

    let names: Vec<&str> = output.iter().map(|e| e.name.as_str()).collect();
    let source_names: Vec<&str> = source.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, source_names);

    for (before, after) in source.iter().zip(&output) {
        if before.name.ends_with(".xhtml") {
            assert_ne!(before.data, after.data, "{} should be translated", before.name);
        } else {
            assert_eq!(before, after, "{} should be copied verbatim", before.name);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_run_with_short_responses_should_keep_original_text() -> Result<()> {
    let book = SampleBook::new()?;
    let mock = MockProvider::dropping_one();
    let controller = common::mock_controller(common::test_config(), mock.clone());

    let summary = completed(controller.run(book.path.clone(), book.output_dir(), false).await?);

    // one batch under the default budget, retried until the attempts run out
    assert_eq!(summary.batches, 1);
    assert_eq!(summary.failed, 6);
    assert_eq!(summary.translated, 0);
    assert_eq!(summary.failed_batches, 1);
    assert_eq!(mock.request_count(), 1 + common::fast_retry().max_attempts as usize);

    let output = book.output("zh-TW.translated.epub");
    assert_eq!(common::read_entry_string(&output, CHAPTER_ONE_PATH)?, CHAPTER_ONE);
    assert_eq!(common::read_entry_string(&output, CHAPTER_TWO_PATH)?, CHAPTER_TWO);

    let issues = fs::read_to_string(book.output("zh-TW.issues.log"))?;
    assert!(issues.contains("batch 1 (atoms 1-6) failed after 2 attempts"));
    Ok(())
}

#[tokio::test]
async fn test_run_should_respect_worker_limit() -> Result<()> {
    let book = SampleBook::new()?;
    let mut config = common::test_config();
    config.book.max_chars_per_call = 5;
    config.book.max_workers = Some(2);
    let mock = MockProvider::slow(30);
    let controller = common::mock_controller(config, mock.clone());

    let summary = completed(controller.run(book.path.clone(), book.output_dir(), false).await?);

    assert_eq!(summary.batches, 6);
    assert_eq!(summary.translated, 6);
    assert!(mock.peak_in_flight() <= 2);
    assert_eq!(mock.request_count(), 7);
    Ok(())
}

#[tokio::test]
async fn test_run_past_failure_ceiling_should_abort_without_output() -> Result<()> {
    let book = SampleBook::new()?;
    let mut config = common::test_config();
    config.book.max_chars_per_call = 5;
    config.book.max_workers = Some(1);
    config.book.max_failed_batches = Some(1);
    // answers the probe, never returns valid JSON
    let controller = common::mock_controller(config, MockProvider::malformed());

    let error = controller
        .run(book.path.clone(), book.output_dir(), false)
        .await
        .expect_err("run should abort");

    match error.downcast_ref::<AppError>() {
        Some(AppError::Aborted { failed, limit }) => {
            assert_eq!(*failed, 2);
            assert_eq!(*limit, 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!book.output("zh-TW.translated.epub").exists());
    assert!(book.output("zh-TW.issues.log").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_with_failing_probe_should_stop_before_batching() -> Result<()> {
    let book = SampleBook::new()?;
    let mock = MockProvider::unauthorized();
    let controller = common::mock_controller(common::test_config(), mock.clone());

    let error = controller
        .run(book.path.clone(), book.output_dir(), false)
        .await
        .expect_err("probe should fail");

    assert!(matches!(error.downcast_ref::<AppError>(), Some(AppError::Precondition(_))));
    assert_eq!(mock.request_count(), 1);
    assert!(!book.output("zh-TW.translated.epub").exists());
    assert!(!book.output("zh-TW.checkpoint.jsonl").exists());

    let report: ProbeReport = serde_json::from_str(&fs::read_to_string(book.output("zh-TW.api-selftest.json"))?)?;
    assert!(!report.ok);
    assert!(report.error.is_some());
    Ok(())
}

#[tokio::test]
async fn test_run_preview_should_translate_prefix_and_write_table() -> Result<()> {
    let book = SampleBook::new()?;
    let mut config = common::test_config();
    config.book.preview_limit = 2;
    let mock = MockProvider::working().with_translator(hello_goodbye);
    let controller = common::mock_controller(config, mock);

    let summary = completed(controller.run(book.path.clone(), book.output_dir(), false).await?);
    assert_eq!(summary.atoms, 2);
    assert_eq!(summary.translated, 2);

    assert!(!book.output("zh-TW.translated.epub").exists());
    let preview = book.output("zh-TW.preview.epub");
    let chapter_one = common::read_entry_string(&preview, CHAPTER_ONE_PATH)?;
    assert!(chapter_one.contains("<h1>你好</h1>"));
    assert!(chapter_one.contains("<p class=\"farewell\">再見</p>"));
    assert_eq!(common::read_entry_string(&preview, CHAPTER_TWO_PATH)?, CHAPTER_TWO);

    let table = fs::read_to_string(book.output("zh-TW.preview.tsv"))?;
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "id\tlocator\tsource\ttranslation");
    assert!(lines[1].starts_with("1\tOEBPS/Text/chapter1.xhtml#"));
    assert!(lines[1].ends_with("\tHello\t你好"));
    assert!(lines[2].ends_with("\tGoodbye\t再見"));
    Ok(())
}

#[tokio::test]
async fn test_run_after_preview_should_resume_from_checkpoint() -> Result<()> {
    let book = SampleBook::new()?;
    let mut config = common::test_config();
    config.book.max_chars_per_call = 8;
    config.book.preview_limit = 2;
    common::mock_controller(config.clone(), MockProvider::working())
        .run(book.path.clone(), book.output_dir(), false)
        .await?;
    assert!(book.output("zh-TW.checkpoint.jsonl").exists());

    config.book.preview_limit = 0;
    let mock = MockProvider::working();
    let summary = completed(
        common::mock_controller(config, mock.clone())
            .run(book.path.clone(), book.output_dir(), false)
            .await?,
    );

    // "Hello" and "Goodbye" come from the preview run
    assert_eq!(summary.batches, 6);
    assert_eq!(summary.checkpoint_hits, 2);
    assert_eq!(mock.request_count(), 1 + 4);
    assert_eq!(summary.translated, 6);
    assert!(!book.output("zh-TW.checkpoint.jsonl").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_with_existing_output_should_skip_unless_forced() -> Result<()> {
    let book = SampleBook::new()?;
    let existing = book.output("zh-TW.translated.epub");
    fs::write(&existing, b"previous")?;

    let mock = MockProvider::working();
    let outcome = common::mock_controller(common::test_config(), mock.clone())
        .run(book.path.clone(), book.output_dir(), false)
        .await?;
    assert!(matches!(outcome, RunOutcome::Skipped(_)));
    assert_eq!(mock.request_count(), 0);
    assert_eq!(fs::read(&existing)?, b"previous");

    common::mock_controller(common::test_config(), MockProvider::working())
        .run(book.path.clone(), book.output_dir(), true)
        .await?;
    assert_eq!(common::read_zip(&existing)?[0].name, "mimetype");
    Ok(())
}

#[tokio::test]
async fn test_run_with_skip_convert_should_reject_non_epub_input() -> Result<()> {
    let book = SampleBook::new()?;
    let mobi = book.dir.path().join("book.mobi");
    fs::write(&mobi, b"not really a mobi")?;
    let mut config = common::test_config();
    config.book.skip_convert = true;
    let mock = MockProvider::working();

    let error = common::mock_controller(config, mock.clone())
        .run(mobi, book.output_dir(), false)
        .await
        .expect_err("should refuse to skip conversion");

    assert!(matches!(error.downcast_ref::<AppError>(), Some(AppError::Precondition(_))));
    assert_eq!(mock.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_run_with_unknown_input_should_fail_precondition() -> Result<()> {
    let book = SampleBook::new()?;
    let text = book.dir.path().join("notes.txt");
    fs::write(&text, "plain text")?;

    let error = common::mock_controller(common::test_config(), MockProvider::working())
        .run(text, book.output_dir(), false)
        .await
        .expect_err("should reject unknown input");

    assert!(matches!(error.downcast_ref::<AppError>(), Some(AppError::Precondition(_))));
    Ok(())
}
