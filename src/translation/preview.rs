/*!
 * Preview mode: translate only the first N atoms and write an audit table.
 */

use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

use super::atom::Atom;

/// Restricts a run to a prefix of the atom stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewController {
    limit: Option<usize>,
}

impl PreviewController {
    /// `0` disables previewing
    pub fn new(limit: usize) -> Self {
        Self {
            limit: (limit > 0).then_some(limit),
        }
    }

    pub fn is_active(&self) -> bool {
        self.limit.is_some()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Keep the first `limit` atoms in book order
    pub fn restrict(&self, mut atoms: Vec<Atom>) -> Vec<Atom> {
        if let Some(limit) = self.limit {
            if atoms.len() > limit {
                info!("Preview: translating the first {} of {} atoms", limit, atoms.len());
                atoms.truncate(limit);
            }
        }
        atoms
    }

    /// Write the audit table of processed atoms
    pub fn write_audit_table(&self, path: &Path, atoms: &[Atom]) -> Result<()> {
        fs::write(path, audit_table(atoms))
            .with_context(|| format!("Failed to write preview table: {}", path.display()))
    }
}

/// Tab-separated `id, locator, source, translation`; failed atoms have an empty translation
pub fn audit_table(atoms: &[Atom]) -> String {
    let mut table = String::from("id\tlocator\tsource\ttranslation\n");
    for atom in atoms {
        let translation = atom
            .translated_text
            .as_deref()
            .filter(|_| atom.is_translated())
            .unwrap_or_default();
        table.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            atom.id,
            atom.locator,
            cell(atom.core_text()),
            cell(translation)
        ));
    }
    table
}

fn cell(text: &str) -> String {
    text.replace(['\t', '\r', '\n'], " ")
}
