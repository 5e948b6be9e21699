/*!
 * Tests for file type detection and output naming
 */

use anyhow::Result;
use std::fs;
use std::path::Path;

use bookwai::file_utils::{FileManager, FileType, OutputPaths};

use crate::common;

#[test]
fn test_detect_file_type_without_extension_should_sniff_epub_header() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("download");
    common::write_zip(&path, &common::sample_entries())?;
    assert_eq!(FileManager::detect_file_type(&path)?, FileType::Epub);
    Ok(())
}

#[test]
fn test_detect_file_type_should_recognise_palm_header() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("book.bin");
    let mut header = vec![0u8; 78];
    header[60..68].copy_from_slice(b"BOOKMOBI");
    fs::write(&path, &header)?;
    assert_eq!(FileManager::detect_file_type(&path)?, FileType::Convertible);

    let azw3 = dir.path().join("book.AZW3");
    fs::write(&azw3, b"")?;
    assert_eq!(FileManager::detect_file_type(&azw3)?, FileType::Convertible);
    Ok(())
}

#[test]
fn test_detect_file_type_with_missing_file_should_fail() {
    assert!(FileManager::detect_file_type("no/such/book.epub").is_err());
}

#[test]
fn test_output_paths_for_converted_input_should_use_stem() {
    let paths = OutputPaths::new(Path::new("/library/Moby Dick.mobi"), Path::new("/out"), "fr");
    assert_eq!(paths.translated, Path::new("/out/Moby Dick.fr.translated.epub"));
    assert_eq!(paths.container(true), Path::new("/out/Moby Dick.fr.preview.epub"));
    assert_eq!(paths.container(false), paths.translated.as_path());
    assert_eq!(paths.probe, Path::new("/out/Moby Dick.fr.api-selftest.json"));
}
