use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_config::Config;
use crate::converter::{ConvertedBook, Converter};
use crate::epub::{AtomExtractor, Package, Reinjector};
use crate::errors::AppError;
use crate::file_utils::{FileManager, FileType, OutputPaths};
use crate::language_utils::language_display_name;
use crate::translation::{
    BatchTranslator, CapabilityProbe, Checkpoint, DispatchOutcome, JobSettings, JobSummary, PreviewController,
    ProviderProfile, TranslationJob, TranslationService, plan_batches,
};

// @module: Application controller for book translation

/// What a run produced
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The output already existed and `force` was not set
    Skipped(PathBuf),
    /// A container was written
    Completed { output: PathBuf, summary: JobSummary },
}

/// Main application controller for book translation
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Pre-built service, used instead of one derived from the config
    service: Option<TranslationService>,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config, service: None })
    }

    /// Create a controller that translates through the given service
    pub fn with_service(config: Config, service: TranslationService) -> Self {
        Self {
            config,
            service: Some(service),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Translate one book into `output_dir`
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<RunOutcome> {
        let start_time = std::time::Instant::now();
        let book = &self.config.book;
        let target_language = self.config.target_language.as_str();

        if !FileManager::file_exists(&input_file) {
            return Err(AppError::Precondition(format!("Input file does not exist: {:?}", input_file)).into());
        }

        let file_type = FileManager::detect_file_type(&input_file)?;
        if book.skip_convert && file_type != FileType::Epub {
            return Err(AppError::Precondition(format!(
                "--skip-convert requires an EPUB input, got {:?}",
                input_file
            ))
            .into());
        }

        FileManager::ensure_dir(&output_dir)?;
        let paths = OutputPaths::new(&input_file, &output_dir, target_language);
        let preview = PreviewController::new(book.preview_limit);
        let output_path = paths.container(preview.is_active()).to_path_buf();

        if output_path.exists() && !force_overwrite {
            warn!("Skipping file, translation already exists (use -f to force overwrite)");
            return Ok(RunOutcome::Skipped(output_path));
        }

        // Keeps the converted file alive until the container is written
        let converted: Option<ConvertedBook> = match file_type {
            FileType::Epub => None,
            FileType::Convertible => {
                let converter = Converter::locate(book.converter_path.as_deref())?;
                Some(converter.convert(&input_file).await?)
            }
            FileType::Unknown => {
                return Err(AppError::Precondition(format!("Unsupported input format: {:?}", input_file)).into());
            }
        };
        let epub_path = converted.as_ref().map_or(input_file.as_path(), |c| c.path.as_path());

        let mut package = Package::open(epub_path).map_err(AppError::from)?;
        let atoms = AtomExtractor::new(book.translate_alt_text).extract(&package);
        let documents = package.documents().len();
        info!("Extracted {} atoms from {} documents", atoms.len(), documents);
        let atoms = preview.restrict(atoms);

        let service = match &self.service {
            Some(service) => service.clone(),
            None => TranslationService::new(self.config.translation.clone())
                .map_err(|e| AppError::Precondition(e.to_string()))?,
        };

        let max_workers =
            ProviderProfile::for_provider(self.config.translation.provider).effective_workers(book.max_workers);
        let settings = JobSettings {
            target_language: target_language.to_string(),
            model: service.model(),
            max_workers,
            max_chars_per_call: book.max_chars_per_call,
            retry: service.retry.clone(),
            preview_limit: preview.limit(),
            max_failed_batches: book.max_failed_batches,
        };
        let mut job = TranslationJob::new(settings, atoms);

        CapabilityProbe::new(&service)
            .run(target_language, &paths.probe, job.run_id)
            .await?;

        let batches = plan_batches(&job.atoms, job.settings.max_chars_per_call);
        let language = language_display_name(target_language).unwrap_or_else(|_| target_language.to_string());
        info!(
            "Translating {} atoms into {} in {} batches with {} ({}), {} workers",
            job.atoms.len(),
            language,
            batches.len(),
            service.provider_name(),
            job.settings.model,
            max_workers
        );

        let checkpoint = if book.resume {
            Some(Checkpoint::open(&paths.checkpoint)?)
        } else {
            None
        };

        let progress_bar = ProgressBar::new(batches.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("=> "));

        let translator = BatchTranslator::new(service, max_workers);
        let outcome = translator
            .translate_batches(&mut job, &batches, checkpoint.as_ref(), |done, _| {
                progress_bar.set_position(done as u64);
            })
            .await;
        progress_bar.finish_and_clear();

        if let DispatchOutcome::Aborted { failed, limit } = outcome {
            self.write_issues(&paths.issues, &job, &package)?;
            error!("Aborted after {} failed batches, no output written", failed);
            return Err(AppError::Aborted { failed, limit }.into());
        }

        let rewritten = Reinjector::apply_package(&mut package, &job.atoms).map_err(AppError::from)?;
        debug!("Rewrote {} regions", rewritten);
        package.write(&output_path).map_err(AppError::from)?;
        info!("Wrote {}", output_path.display());
        drop(converted);

        if preview.is_active() {
            preview.write_audit_table(&paths.preview_table, &job.atoms)?;
            info!("Preview table: {}", paths.preview_table.display());
        }

        self.write_issues(&paths.issues, &job, &package)?;

        if let Some(checkpoint) = &checkpoint {
            if !preview.is_active() && job.is_clean() {
                checkpoint.remove()?;
            }
        }

        let summary = job.summary(documents);
        info!("{}", summary);
        info!("Translation completed in {}.", Self::format_duration(start_time.elapsed()));

        Ok(RunOutcome::Completed {
            output: output_path,
            summary,
        })
    }

    /// Record failed batches and untranslatable documents; no file when there is nothing to report
    fn write_issues(&self, path: &Path, job: &TranslationJob, package: &Package) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("Failed to remove old issues log: {:?}", path))?;
        }
        if job.failures.is_empty() && package.passthrough().is_empty() {
            return Ok(());
        }

        FileManager::append_to_log_file(path, &format!("run {}", job.run_id))?;
        for failure in &job.failures {
            FileManager::append_to_log_file(path, &failure.to_string())?;
        }
        for document in package.passthrough() {
            FileManager::append_to_log_file(path, &format!("document {} left untranslated", document))?;
        }
        warn!(
            "{} failed batches; their atoms keep the source text (see {})",
            job.failures.len(),
            path.display()
        );
        Ok(())
    }

    /// Format a duration for the end-of-run message
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
