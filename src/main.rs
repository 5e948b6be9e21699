#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info};
use std::io::Write;
use std::path::{Path, PathBuf};

use bookwai::app_config::{self, Config, TranslationProvider};
use bookwai::{Controller, RunOutcome};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    Ollama,
    #[value(name = "lmstudio")]
    LMStudio,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a book (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for bookwai
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
struct TranslateArgs {
    /// Input book (.epub, or .mobi/.azw/.azw3/.prc/.kf8 through ebook-convert)
    #[arg(value_name = "INPUT")]
    input_path: Option<PathBuf>,

    /// Target language tag (e.g. 'zh-TW', 'fr', 'pt-BR')
    #[arg(short, long)]
    target: Option<String>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliTranslationProvider>,

    /// API key for the provider
    #[arg(long, env = "BOOKWAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Treat the input as EPUB and never call the converter
    #[arg(long)]
    skip_convert: bool,

    /// Character budget of one request
    #[arg(long)]
    max_chars_per_call: Option<usize>,

    /// Translate only the first N atoms and write an audit table (0 = off)
    #[arg(long)]
    preview_limit: Option<usize>,

    /// Batches in flight at once (1-25)
    #[arg(short = 'w', long)]
    max_workers: Option<usize>,

    /// Abort once more batches than this have failed
    #[arg(long)]
    max_failed_batches: Option<usize>,

    /// Ignore and do not write the checkpoint file
    #[arg(long)]
    no_resume: bool,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// bookwai - translate EPUB books with AI
#[derive(Parser, Debug)]
#[command(name = "bookwai")]
#[command(version)]
#[command(about = "AI-powered EPUB translation tool")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "bookwai translates the text of an EPUB with AI providers and writes a translated copy.

EXAMPLES:
    bookwai book.epub                            # Translate using default config
    bookwai -t fr book.epub                      # Translate into French
    bookwai -p ollama -m qwen2.5:7b book.epub    # Use a specific provider and model
    bookwai --preview-limit 50 book.epub         # Preview the first 50 atoms
    bookwai book.mobi                            # Convert with ebook-convert first
    bookwai completions bash > bookwai.bash      # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.

SUPPORTED PROVIDERS:
    openai    - OpenAI API (requires OPENAI_API_KEY or --api-key)
    anthropic - Anthropic API (requires ANTHROPIC_API_KEY or --api-key)
    ollama    - Local Ollama server
    lmstudio  - LM Studio local server (OpenAI-compatible on http://localhost:1234/v1)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    args: TranslateArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // the filter lives in log::max_level; the logger itself lets everything through
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Glyph for log level
    fn glyph_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "✗",
            Level::Warn => "!",
            Level::Info => "·",
            Level::Debug => "?",
            Level::Trace => "…",
        }
    }

    // @returns: ANSI color for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {} {}\x1B[0m",
                Self::color_for_level(level),
                now,
                Self::glyph_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Info until the config is loaded
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "bookwai", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => run_translate(cli.args).await,
    }
}

async fn run_translate(options: TranslateArgs) -> Result<()> {
    if let Some(level) = &options.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    let input_path = options
        .input_path
        .clone()
        .ok_or_else(|| anyhow!("INPUT is required when no subcommand is specified"))?;

    let mut config = Config::load_or_create(&options.config)?;
    apply_overrides(&mut config, &options);
    config.validate().context("Configuration validation failed")?;

    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }

    let output_dir = input_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let controller = Controller::with_config(config)?;
    match controller.run(input_path, output_dir, options.force).await {
        Ok(RunOutcome::Completed { output, summary }) => {
            if summary.failed > 0 {
                info!("Done with {} untranslated atoms: {}", summary.failed, output.display());
            } else {
                info!("Success: {}", output.display());
            }
            Ok(())
        }
        Ok(RunOutcome::Skipped(_)) => Ok(()),
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

/// CLI values take precedence over the config file
fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(provider) = &options.provider {
        config.translation.provider = provider.clone().into();
    }
    if let Some(model) = &options.model {
        config.set_model(model);
    }
    if let Some(api_key) = options.api_key.as_deref().filter(|k| !k.is_empty()) {
        config.set_api_key(api_key);
    }
    if let Some(target) = &options.target {
        config.target_language = target.clone();
    }
    if options.skip_convert {
        config.book.skip_convert = true;
    }
    if let Some(max_chars) = options.max_chars_per_call {
        config.book.max_chars_per_call = max_chars;
    }
    if let Some(limit) = options.preview_limit {
        config.book.preview_limit = limit;
    }
    if let Some(workers) = options.max_workers {
        config.book.max_workers = Some(workers);
    }
    if let Some(limit) = options.max_failed_batches {
        config.book.max_failed_batches = Some(limit);
    }
    if options.no_resume {
        config.book.resume = false;
    }
    if let Some(level) = &options.log_level {
        config.log_level = level.clone().into();
    }
}
