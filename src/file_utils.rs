use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

// @module: File and path utilities

/// Extensions handled by the external converter
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["mobi", "azw", "azw3", "prc", "kf8"];

/// Offset of the type/creator tag in a PalmDOC header
const PALM_TYPE_OFFSET: usize = 60;

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Append content to a log file with timestamp
    pub fn append_to_log_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        if let Some(parent) = path.as_ref().parent() {
            Self::ensure_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path.as_ref()))?;

        writeln!(file, "[{}] {}", timestamp, content)
            .with_context(|| format!("Failed to write to log file: {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Detect whether a file is an EPUB, a format the converter understands, or neither
    pub fn detect_file_type<P: AsRef<Path>>(path: P) -> Result<FileType> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("File does not exist: {:?}", path));
        }

        if let Some(ext) = path.extension() {
            let ext_str = ext.to_string_lossy().to_lowercase();
            if ext_str == "epub" {
                return Ok(FileType::Epub);
            }
            if CONVERTIBLE_EXTENSIONS.contains(&ext_str.as_str()) {
                return Ok(FileType::Convertible);
            }
        }

        // Fall back to the file header
        let mut header = [0u8; 128];
        let read = File::open(path)
            .and_then(|mut file| file.read(&mut header))
            .with_context(|| format!("Failed to read file: {:?}", path))?;
        Ok(Self::sniff(&header[..read]))
    }

    fn sniff(header: &[u8]) -> FileType {
        // zip local header followed by the stored `mimetype` entry
        if header.starts_with(b"PK\x03\x04") && header.get(30..38) == Some(b"mimetype".as_slice()) {
            return FileType::Epub;
        }
        let palm_tag = header.get(PALM_TYPE_OFFSET..PALM_TYPE_OFFSET + 8);
        if matches!(palm_tag, Some(b"BOOKMOBI") | Some(b"TEXtREAd")) {
            return FileType::Convertible;
        }
        FileType::Unknown
    }
}

/// Enum representing different file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// EPUB container
    Epub,
    /// E-reader format handled by the converter
    Convertible,
    /// Unknown file type
    Unknown,
}

/// Every file a run may produce, derived from the input name and target language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub translated: PathBuf,
    pub preview: PathBuf,
    pub preview_table: PathBuf,
    pub probe: PathBuf,
    pub checkpoint: PathBuf,
    pub issues: PathBuf,
}

impl OutputPaths {
    // @generates: `<stem>.<lang>.<suffix>` next to the input
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(input_file: P1, output_dir: P2, target_language: &str) -> Self {
        let stem = input_file
            .as_ref()
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let output_dir = output_dir.as_ref();
        let path = |suffix: &str| output_dir.join(format!("{}.{}.{}", stem, target_language, suffix));

        Self {
            translated: path("translated.epub"),
            preview: path("preview.epub"),
            preview_table: path("preview.tsv"),
            probe: path("api-selftest.json"),
            checkpoint: path("checkpoint.jsonl"),
            issues: path("issues.log"),
        }
    }

    /// Container written by a run in the given mode
    pub fn container(&self, preview: bool) -> &Path {
        if preview { &self.preview } else { &self.translated }
    }
}
