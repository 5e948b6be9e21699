/*!
 * Atom extraction.
 *
 * Walks the content documents in reading order and turns every non-blank
 * translatable slot into an `Atom`, numbered with one counter across the
 * whole package.
 */

use log::debug;

use super::container::{ContentDocument, Package};
use super::markup::AtomTarget;
use crate::translation::atom::{Atom, Locator};

/// Produces the ordered atom stream of a package
#[derive(Debug, Clone)]
pub struct AtomExtractor {
    translate_alt_text: bool,
}

impl Default for AtomExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AtomExtractor {
    pub fn new(translate_alt_text: bool) -> Self {
        Self { translate_alt_text }
    }

    /// Atoms of a single document, numbered from `first_id`
    pub fn extract_document(&self, document: &ContentDocument, first_id: usize) -> Vec<Atom> {
        let tree = document.tree();
        let mut atoms = Vec::new();

        for (index, slot) in tree.slots().iter().enumerate() {
            if slot.target == AtomTarget::AltAttribute && !self.translate_alt_text {
                continue;
            }
            let Some(text) = tree.decoded(index) else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }

            atoms.push(Atom::new(
                first_id + atoms.len(),
                Locator {
                    document: document.path.clone(),
                    node: slot.path.clone(),
                    target: slot.target,
                },
                text.into_owned(),
            ));
        }
        atoms
    }

    /// Every atom of the package in book order, ids starting at 1
    pub fn extract(&self, package: &Package) -> Vec<Atom> {
        let mut atoms = Vec::new();
        for document in package.documents() {
            let found = self.extract_document(document, atoms.len() + 1);
            debug!("{}: {} atoms", document.path, found.len());
            atoms.extend(found);
        }
        atoms
    }
}
