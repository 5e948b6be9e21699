/*!
 * Writes a package back to a new EPUB container.
 *
 * `mimetype` goes first and stored. Untouched entries are copied raw, with
 * their original compressed bytes. Rewritten documents are recompressed.
 * The archive is assembled in a temporary file next to the target and only
 * renamed into place once complete.
 */

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use log::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::container::{ContentDocument, EntryInfo, MIMETYPE_ENTRY, Package};
use crate::errors::ContainerError;

/// Rebuilds a container from an opened package
pub struct Repackager<'a> {
    package: &'a Package,
}

impl<'a> Repackager<'a> {
    pub fn new(package: &'a Package) -> Self {
        Self { package }
    }

    /// Write the output container atomically.
    ///
    /// Either a complete archive ends up at `output` or the path is left as it
    /// was; a failed run never replaces a previously valid file.
    pub fn write(&self, output: &Path) -> Result<(), ContainerError> {
        let directory = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&directory)?;

        let mut staging = tempfile::Builder::new()
            .prefix(".bookwai-")
            .suffix(".epub.part")
            .tempfile_in(&directory)?;

        {
            let source = File::open(self.package.source())?;
            let mut archive = ZipArchive::new(BufReader::new(source))?;
            let mut writer = ZipWriter::new(BufWriter::new(staging.as_file_mut()));
            self.write_entries(&mut archive, &mut writer)?;
            let mut inner = writer.finish()?;
            inner.flush()?;
        }
        staging.as_file().sync_all()?;

        staging.persist(output).map_err(|e| ContainerError::Io(e.error))?;
        debug!("Wrote container {:?}", output);
        Ok(())
    }

    fn write_entries<R, W>(
        &self,
        archive: &mut ZipArchive<R>,
        writer: &mut ZipWriter<W>,
    ) -> Result<(), ContainerError>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let rewritten: HashMap<&str, &ContentDocument> = self
            .package
            .documents()
            .iter()
            .filter(|d| d.is_modified())
            .map(|d| (d.path.as_str(), d))
            .collect();

        let entries = self.package.entries();
        if let Some(mimetype) = entries.iter().find(|e| e.name == MIMETYPE_ENTRY) {
            Self::write_mimetype(archive, writer, mimetype)?;
        }

        for entry in entries.iter().filter(|e| e.name != MIMETYPE_ENTRY) {
            match rewritten.get(entry.name.as_str()) {
                Some(document) => {
                    let method = match entry.compression {
                        CompressionMethod::Stored => CompressionMethod::Stored,
                        _ => CompressionMethod::Deflated,
                    };
                    let options = SimpleFileOptions::default().compression_method(method);
                    writer.start_file(entry.name.as_str(), options)?;
                    writer.write_all(&document.to_bytes())?;
                }
                None => writer.raw_copy_file(archive.by_index_raw(entry.index)?)?,
            }
        }
        Ok(())
    }

    fn write_mimetype<R, W>(
        archive: &mut ZipArchive<R>,
        writer: &mut ZipWriter<W>,
        entry: &EntryInfo,
    ) -> Result<(), ContainerError>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        if entry.compression == CompressionMethod::Stored {
            writer.raw_copy_file(archive.by_index_raw(entry.index)?)?;
            return Ok(());
        }

        let mut contents = Vec::new();
        archive.by_index(entry.index)?.read_to_end(&mut contents)?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file(MIMETYPE_ENTRY, options)?;
        writer.write_all(&contents)?;
        Ok(())
    }
}
