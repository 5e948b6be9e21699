/*!
 * Resumable batch results.
 *
 * Every successful batch is appended to a JSON Lines file keyed by a digest of
 * the target language, the model and the batch's (id, text) pairs. A later run
 * over the same atoms picks those results up instead of calling the provider
 * again, so a preview run warms the checkpoint for the full run.
 */

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::prompts::Segment;

/// One line of the checkpoint file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointEntry {
    key: String,
    batch: usize,
    translations: Vec<Segment>,
    at: String,
}

/// Append-only store of completed batches
pub struct Checkpoint {
    path: PathBuf,

    /// Entries by key
    entries: Arc<RwLock<HashMap<String, Vec<Segment>>>>,

    /// Lookups answered from the file
    hits: Arc<RwLock<usize>>,
}

impl Checkpoint {
    /// Load a checkpoint file, or start an empty one if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        let mut entries = HashMap::new();

        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open checkpoint: {}", path.display()))?;
            let mut skipped = 0;
            for line in BufReader::new(file).lines() {
                let line = line.with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<CheckpointEntry>(&line) {
                    Ok(entry) => {
                        entries.insert(entry.key, entry.translations);
                    }
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!("Skipped {} malformed checkpoint lines in {}", skipped, path.display());
            }
            debug!("Loaded {} checkpointed batches from {}", entries.len(), path.display());
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries: Arc::new(RwLock::new(entries)),
            hits: Arc::new(RwLock::new(0)),
        })
    }

    /// Digest identifying a batch request
    pub fn key(target_language: &str, model: &str, segments: &[Segment]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(target_language.as_bytes());
        hasher.update([0]);
        hasher.update(model.as_bytes());
        hasher.update([0]);
        for segment in segments {
            hasher.update(segment.id.to_le_bytes());
            hasher.update(segment.text.as_bytes());
            hasher.update([0]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Stored translations for a key
    pub fn get(&self, key: &str) -> Option<Vec<Segment>> {
        let found = self.entries.read().get(key).cloned();
        if found.is_some() {
            *self.hits.write() += 1;
        }
        found
    }

    /// Record a completed batch, in memory and on disk
    pub fn append(&self, key: &str, batch: usize, translations: &[Segment]) -> Result<()> {
        let entry = CheckpointEntry {
            key: key.to_string(),
            batch,
            translations: translations.to_vec(),
            at: Utc::now().to_rfc3339(),
        };
        let line = serde_json::to_string(&entry).context("Failed to serialize checkpoint entry")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open checkpoint: {}", self.path.display()))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write checkpoint: {}", self.path.display()))?;

        self.entries.write().insert(entry.key, entry.translations);
        Ok(())
    }

    /// Delete the file once the run no longer needs it
    pub fn remove(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove checkpoint: {}", self.path.display()))?;
            debug!("Removed checkpoint {}", self.path.display());
        }
        Ok(())
    }

    pub fn hits(&self) -> usize {
        *self.hits.read()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
