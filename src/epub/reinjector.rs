/*!
 * Writes translated atoms back into their documents.
 */

use std::collections::HashMap;

use log::debug;

use super::container::{ContentDocument, Package};
use crate::errors::ContainerError;
use crate::translation::atom::Atom;

/// Puts translations back at their locators
pub struct Reinjector;

impl Reinjector {
    /// Apply every translated atom that belongs to `document`.
    ///
    /// Atoms that are not translated keep their original text. A translation
    /// identical to the source core is not written, so the bytes stay as
    /// they were. Returns the number of regions rewritten.
    pub fn apply(document: &mut ContentDocument, atoms: &[&Atom]) -> Result<usize, ContainerError> {
        let mut replacements = Vec::new();

        for atom in atoms.iter().filter(|a| a.locator.document == document.path) {
            let Some(translation) = atom.translated_text.as_ref().filter(|_| atom.is_translated()) else {
                continue;
            };

            let tree = document.tree();
            let mismatch = || ContainerError::LocatorMismatch {
                path: document.path.clone(),
                locator: atom.locator.to_string(),
            };
            let slot = tree
                .lookup(&atom.locator.node, atom.locator.target)
                .ok_or_else(mismatch)?;
            if tree.decoded(slot).as_deref() != Some(atom.source_text.as_str()) {
                return Err(mismatch());
            }

            if translation.as_str() != atom.core_text() {
                replacements.push((slot, translation.clone()));
            }
        }

        let count = replacements.len();
        document
            .rewrite(&replacements)
            .map_err(|source| ContainerError::Markup {
                path: document.path.clone(),
                source,
            })?;
        Ok(count)
    }

    /// Apply atoms across every document of the package
    pub fn apply_package(package: &mut Package, atoms: &[Atom]) -> Result<usize, ContainerError> {
        let mut by_document: HashMap<&str, Vec<&Atom>> = HashMap::new();
        for atom in atoms.iter().filter(|a| a.is_translated()) {
            by_document
                .entry(atom.locator.document.as_str())
                .or_default()
                .push(atom);
        }

        let mut total = 0;
        for document in package.documents_mut() {
            if let Some(doc_atoms) = by_document.get(document.path.as_str()) {
                let count = Self::apply(document, doc_atoms)?;
                debug!("{}: rewrote {} regions", document.path, count);
                total += count;
            }
        }
        Ok(total)
    }
}
