/*!
 * External e-book converter.
 *
 * Runs Calibre's `ebook-convert` to turn MOBI/AZW-family inputs into an EPUB
 * inside a temporary directory that lives as long as the returned value.
 */

use log::{debug, error, info};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

use crate::errors::AppError;

const CONVERTER_NAME: &str = "ebook-convert";
const MACOS_CALIBRE: &str = "/Applications/calibre.app/Contents/MacOS/ebook-convert";
const CONVERT_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const CONVERT_ARGS: &[&str] = &["--keep-ligatures", "--no-default-epub-cover", "--embed-all-fonts"];

/// A converted EPUB; the file is removed when this is dropped
#[derive(Debug)]
pub struct ConvertedBook {
    pub path: PathBuf,
    _workdir: TempDir,
}

/// Wrapper around `ebook-convert`
#[derive(Debug, Clone)]
pub struct Converter {
    executable: PathBuf,
}

impl Converter {
    /// Locate the converter: explicit path, then `PATH`, then the default macOS install
    pub fn locate(configured: Option<&Path>) -> Result<Self, AppError> {
        if let Some(path) = configured {
            if path.is_file() {
                return Ok(Self { executable: path.to_path_buf() });
            }
            return Err(AppError::Conversion(format!(
                "Configured converter not found: {}",
                path.display()
            )));
        }

        find_in_path(CONVERTER_NAME)
            .or_else(|| Some(PathBuf::from(MACOS_CALIBRE)).filter(|p| p.is_file()))
            .map(|executable| Self { executable })
            .ok_or_else(|| {
                AppError::Conversion(format!(
                    "{} not found; install Calibre or set book.converter_path",
                    CONVERTER_NAME
                ))
            })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Convert `input` to EPUB. Success needs exit status 0 and a non-empty output file.
    pub async fn convert(&self, input: &Path) -> Result<ConvertedBook, AppError> {
        let workdir = tempfile::Builder::new()
            .prefix("bookwai-convert-")
            .tempdir()
            .map_err(|e| AppError::Conversion(format!("Failed to create temporary directory: {}", e)))?;
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let output = workdir.path().join(format!("{}.epub", stem));

        info!("Converting {} with {}", input.display(), self.executable.display());
        let command = Command::new(&self.executable)
            .arg(input)
            .arg(&output)
            .args(CONVERT_ARGS)
            .kill_on_drop(true)
            .output();

        let result = tokio::select! {
            result = command => {
                result.map_err(|e| AppError::Conversion(format!("Failed to execute {}: {}", self.executable.display(), e)))?
            },
            _ = tokio::time::sleep(CONVERT_TIMEOUT) => {
                return Err(AppError::Conversion(format!("{} timed out", CONVERTER_NAME)));
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            error!("Conversion failed: {}", tail.join(" | "));
            return Err(AppError::Conversion(format!(
                "{} exited with {}",
                CONVERTER_NAME, result.status
            )));
        }

        let size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(AppError::Conversion(format!(
                "{} produced no output for {}",
                CONVERTER_NAME,
                input.display()
            )));
        }
        debug!("Converted to {} ({} bytes)", output.display(), size);

        Ok(ConvertedBook {
            path: output,
            _workdir: workdir,
        })
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        let exe = dir.join(format!("{}.exe", name));
        exe.is_file().then_some(exe)
    })
}
