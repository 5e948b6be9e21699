/*!
 * EPUB package model.
 *
 * Opens the zip container, records every entry in archive order, works out
 * the reading order of the content documents (OPF spine first, then any
 * remaining markup) and parses each of them into a `MarkupTree`.
 */

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use log::{debug, warn};
use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;
use url::Url;
use zip::{CompressionMethod, ZipArchive};

use super::markup::MarkupTree;
use super::repackager::Repackager;
use crate::errors::{ContainerError, MarkupError};

/// Identification entry that must stay first and stored
pub const MIMETYPE_ENTRY: &str = "mimetype";

const CONTAINER_ENTRY: &str = "META-INF/container.xml";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

static DECLARED_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:encoding|charset)\s*=\s*["']?([A-Za-z0-9._:-]+)"#)
        .expect("encoding declaration pattern is valid")
});

/// Metadata of one archive entry, in archive order
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub index: usize,
    pub name: String,
    pub compression: CompressionMethod,
    pub is_dir: bool,
}

/// Byte encoding a content document was stored in
#[derive(Debug, Clone, Copy)]
pub struct DocumentEncoding {
    pub encoding: &'static Encoding,
    pub bom: bool,
}

impl DocumentEncoding {
    /// Detect the encoding of a document and decode it.
    ///
    /// A UTF-8 BOM wins; otherwise the XML declaration or a meta charset is
    /// honoured, defaulting to UTF-8. UTF-16 is refused because it cannot be
    /// written back through the same byte-level splicing.
    pub fn decode(bytes: &[u8]) -> Result<(String, Self), MarkupError> {
        if bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]) {
            return Err(MarkupError::UnsupportedEncoding("UTF-16".to_string()));
        }

        let (body, bom) = match bytes.strip_prefix(UTF8_BOM) {
            Some(rest) => (rest, true),
            None => (bytes, false),
        };
        let encoding = if bom {
            UTF_8
        } else {
            declared_encoding(body).unwrap_or(UTF_8)
        };
        if encoding == UTF_16LE || encoding == UTF_16BE {
            return Err(MarkupError::UnsupportedEncoding(encoding.name().to_string()));
        }

        let text = if encoding == UTF_8 {
            String::from_utf8(body.to_vec()).map_err(|_| MarkupError::Encoding("UTF-8".to_string()))?
        } else {
            encoding
                .decode_without_bom_handling_and_without_replacement(body)
                .ok_or_else(|| MarkupError::Encoding(encoding.name().to_string()))?
                .into_owned()
        };

        Ok((text, Self { encoding, bom }))
    }

    /// Encode text back into this encoding, restoring the BOM if there was one
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut output = Vec::with_capacity(text.len() + UTF8_BOM.len());
        if self.bom {
            output.extend_from_slice(UTF8_BOM);
        }
        if self.encoding == UTF_8 {
            output.extend_from_slice(text.as_bytes());
        } else {
            let (bytes, _, unmappable) = self.encoding.encode(text);
            if unmappable {
                debug!(
                    "Characters outside {} were written as numeric references",
                    self.encoding.name()
                );
            }
            output.extend_from_slice(&bytes);
        }
        output
    }
}

fn declared_encoding(body: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&body[..body.len().min(1024)]);
    let captures = DECLARED_ENCODING.captures(&head)?;
    Encoding::for_label(captures[1].as_bytes())
}

/// A markup document inside the package, owned by whichever stage works on it
#[derive(Debug)]
pub struct ContentDocument {
    pub path: String,
    encoding: DocumentEncoding,
    tree: MarkupTree,
    modified: bool,
}

impl ContentDocument {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Result<Self, MarkupError> {
        let (text, encoding) = DocumentEncoding::decode(bytes)?;
        Ok(Self {
            path: path.into(),
            encoding,
            tree: MarkupTree::parse(text)?,
            modified: false,
        })
    }

    pub fn tree(&self) -> &MarkupTree {
        &self.tree
    }

    /// Rewrite slot cores, marking the document as modified when anything changed
    pub fn rewrite(&mut self, replacements: &[(usize, String)]) -> Result<(), MarkupError> {
        if replacements.is_empty() {
            return Ok(());
        }
        self.tree.rewrite(replacements)?;
        self.modified = true;
        Ok(())
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Serialize back to bytes in the original encoding
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encoding.encode(self.tree.as_str())
    }
}

/// An opened EPUB: entry table plus parsed content documents in reading order
#[derive(Debug)]
pub struct Package {
    source: PathBuf,
    entries: Vec<EntryInfo>,
    documents: Vec<ContentDocument>,
    passthrough: Vec<String>,
}

impl Package {
    /// Open a package. The input file is only ever read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ContainerError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            entries.push(EntryInfo {
                index,
                name: entry.name().to_string(),
                compression: entry.compression(),
                is_dir: entry.is_dir(),
            });
        }

        match entries.first() {
            Some(first) if first.name == MIMETYPE_ENTRY => {}
            _ if entries.iter().any(|e| e.name == MIMETYPE_ENTRY) => {
                warn!("'mimetype' is not the first entry; it will be moved to the front");
            }
            _ => warn!("Package has no 'mimetype' entry: {:?}", path),
        }

        let mut documents = Vec::new();
        let mut passthrough = Vec::new();
        for name in reading_order(&mut archive, &entries) {
            let mut bytes = Vec::new();
            archive.by_name(&name)?.read_to_end(&mut bytes)?;

            match ContentDocument::from_bytes(name.clone(), &bytes) {
                Ok(document) => documents.push(document),
                Err(e) => {
                    warn!("Leaving {} untranslated: {}", name, e);
                    passthrough.push(name);
                }
            }
        }
        debug!(
            "Opened {:?}: {} entries, {} content documents",
            path,
            entries.len(),
            documents.len()
        );

        Ok(Self {
            source: path.to_path_buf(),
            entries,
            documents,
            passthrough,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    /// Content documents in reading order
    pub fn documents(&self) -> &[ContentDocument] {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut [ContentDocument] {
        &mut self.documents
    }

    /// Markup entries that could not be decoded or tokenized
    pub fn passthrough(&self) -> &[String] {
        &self.passthrough
    }

    /// Write the package, with any rewritten documents, to a new container
    pub fn write(&self, output: impl AsRef<Path>) -> Result<(), ContainerError> {
        Repackager::new(self).write(output.as_ref())
    }
}

fn is_markup_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
}

fn read_entry_string<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut text = String::new();
    entry.read_to_string(&mut text).ok()?;
    Some(text)
}

/// Spine documents first, then any other markup entry in archive order
fn reading_order<R: Read + Seek>(archive: &mut ZipArchive<R>, entries: &[EntryInfo]) -> Vec<String> {
    let names: HashSet<&str> = entries
        .iter()
        .filter(|e| !e.is_dir)
        .map(|e| e.name.as_str())
        .collect();
    let mut seen = HashSet::new();
    let mut order = Vec::new();

    let spine = read_entry_string(archive, CONTAINER_ENTRY)
        .and_then(|xml| parse_rootfile(&xml))
        .and_then(|opf_path| {
            read_entry_string(archive, &opf_path).map(|opf| spine_documents(&opf_path, &opf))
        });

    match spine {
        Some(spine) => {
            for name in spine {
                if names.contains(name.as_str()) && seen.insert(name.clone()) {
                    order.push(name);
                }
            }
        }
        None => debug!("No readable OPF package document, using archive order"),
    }

    for entry in entries {
        if !entry.is_dir && is_markup_name(&entry.name) && seen.insert(entry.name.clone()) {
            order.push(entry.name.clone());
        }
    }
    order
}

/// Path of the OPF package document named by `META-INF/container.xml`
fn parse_rootfile(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                if tag.local_name().as_ref() == b"rootfile" {
                    let full_path = tag.try_get_attribute("full-path").ok().flatten()?;
                    let value = full_path.unescape_value().ok()?;
                    return Some(value.into_owned());
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Resolve the spine of an OPF document to archive entry names
fn spine_documents(opf_path: &str, opf: &str) -> Vec<String> {
    let mut reader = Reader::from_str(opf);
    reader.config_mut().trim_text(true);

    let mut manifest: HashMap<String, (String, String)> = HashMap::new();
    let mut spine: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                let attribute = |name: &str| -> Option<String> {
                    tag.try_get_attribute(name)
                        .ok()
                        .flatten()
                        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
                };
                match tag.local_name().as_ref() {
                    b"item" => {
                        if let (Some(id), Some(href)) = (attribute("id"), attribute("href")) {
                            let media_type = attribute("media-type").unwrap_or_default();
                            manifest.insert(id, (href, media_type));
                        }
                    }
                    b"itemref" => {
                        if let Some(idref) = attribute("idref") {
                            spine.push(idref);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Stopped reading OPF at {}: {}", reader.error_position(), e);
                break;
            }
            _ => {}
        }
    }

    spine
        .iter()
        .filter_map(|idref| manifest.get(idref))
        .filter(|(href, media_type)| {
            media_type == "application/xhtml+xml" || media_type == "text/html" || is_markup_name(href)
        })
        .filter_map(|(href, _)| resolve_href(opf_path, href))
        .collect()
}

/// Resolve a manifest href relative to the OPF into a decoded entry name
fn resolve_href(base: &str, href: &str) -> Option<String> {
    let root = Url::parse("http://package.invalid/").ok()?;
    let target = root.join(base).ok()?.join(href).ok()?;
    if target.host_str() != Some("package.invalid") {
        return None;
    }
    let path = target.path().trim_start_matches('/');
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|p| p.into_owned())
}
