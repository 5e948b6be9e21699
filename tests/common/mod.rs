/*!
 * Common test utilities for the bookwai test suite
 */

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use bookwai::app_config::Config;
use bookwai::providers::mock::MockProvider;
use bookwai::translation::{RetryPolicy, TranslationService};
use bookwai::Controller;

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub const CONTENT_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:0b1c2d3e-4f50-6172-8394-a5b6c7d8e9f0</dc:identifier>
    <dc:title>Sample</dc:title>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ch1" href="Text/chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="Text/chapter2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="Styles/book.css" media-type="text/css"/>
    <item id="img" href="Images/lighthouse.png" media-type="image/png"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

/// Two atoms: "Hello" and "Goodbye"
pub const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter One</title><link rel="stylesheet" href="../Styles/book.css"/></head>
<body>
  <h1>Hello</h1>
  <p class="farewell">Goodbye</p>
</body>
</html>
"#;

/// Four atoms: "It was a ", "dark", " night." and the alt text
pub const CHAPTER_TWO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter Two</title><style>p { margin: 0 }</style></head>
<body>
  <p>It was a <em>dark</em> night.</p>
  <img src="../Images/lighthouse.png" alt="A lighthouse"/>
</body>
</html>
"#;

pub const STYLESHEET: &str = "body { font-family: serif; }\n";

/// Not a real PNG; only its bytes matter
pub const IMAGE: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR\x00\x00\x00\x01";

pub const CHAPTER_ONE_PATH: &str = "OEBPS/Text/chapter1.xhtml";
pub const CHAPTER_TWO_PATH: &str = "OEBPS/Text/chapter2.xhtml";

/// One archive entry to write
pub struct Entry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub method: CompressionMethod,
}

impl<'a> Entry<'a> {
    pub fn stored(name: &'a str, data: &'a [u8]) -> Self {
        Self { name, data, method: CompressionMethod::Stored }
    }

    pub fn deflated(name: &'a str, data: &'a [u8]) -> Self {
        Self { name, data, method: CompressionMethod::Deflated }
    }
}

/// Write entries to a zip archive in the given order
pub fn write_zip(path: &Path, entries: &[Entry]) -> Result<()> {
    let mut writer = ZipWriter::new(File::create(path)?);
    for entry in entries {
        let options = SimpleFileOptions::default().compression_method(entry.method);
        writer.start_file(entry.name, options)?;
        writer.write_all(entry.data)?;
    }
    writer.finish()?;
    Ok(())
}

/// Entries of the sample book, mimetype first and stored
pub fn sample_entries() -> Vec<Entry<'static>> {
    vec![
        Entry::stored("mimetype", b"application/epub+zip"),
        Entry::deflated("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        Entry::deflated("OEBPS/content.opf", CONTENT_OPF.as_bytes()),
        Entry::deflated(CHAPTER_ONE_PATH, CHAPTER_ONE.as_bytes()),
        Entry::deflated(CHAPTER_TWO_PATH, CHAPTER_TWO.as_bytes()),
        Entry::deflated("OEBPS/Styles/book.css", STYLESHEET.as_bytes()),
        Entry::stored("OEBPS/Images/lighthouse.png", IMAGE),
    ]
}

/// A temporary directory holding `book.epub`
pub struct SampleBook {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl SampleBook {
    pub fn new() -> Result<Self> {
        Self::with_entries(&sample_entries())
    }

    pub fn with_entries(entries: &[Entry]) -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join("book.epub");
        write_zip(&path, entries)?;
        Ok(Self { dir, path })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// A file next to the book, e.g. `book.zh-TW.translated.epub`
    pub fn output(&self, suffix: &str) -> PathBuf {
        self.dir.path().join(format!("book.{}", suffix))
    }
}

/// An archive entry as read back
#[derive(Debug, Clone, PartialEq)]
pub struct ReadEntry {
    pub name: String,
    pub method: CompressionMethod,
    pub data: Vec<u8>,
}

/// Every entry of an archive in archive order, decompressed
pub fn read_zip(path: &Path) -> Result<Vec<ReadEntry>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        entries.push(ReadEntry {
            name: file.name().to_string(),
            method: file.compression(),
            data,
        });
    }
    Ok(entries)
}

/// Decompressed contents of one entry as text
pub fn read_entry_string(path: &Path, name: &str) -> Result<String> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut text = String::new();
    archive.by_name(name)?.read_to_string(&mut text)?;
    Ok(text)
}

/// Retries that finish in milliseconds
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        rate_limit_multiplier: 2,
    }
}

/// Default config with a small worker pool and no failure ceiling
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.target_language = "zh-TW".to_string();
    config.book.max_workers = Some(2);
    config
}

/// Controller translating through the given mock
pub fn mock_controller(config: Config, mock: MockProvider) -> Controller {
    let service = TranslationService::with_mock(mock, config.translation.clone()).with_retry_policy(fast_retry());
    Controller::with_service(config, service)
}

/// Route log output through env_logger once per test binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
