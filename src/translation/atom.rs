/*!
 * Translatable atoms and their locators.
 */

use std::fmt;

use crate::epub::markup::{AtomTarget, NodePath, XML_WHITESPACE};

/// Stable address of an atom: document, element and region
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    /// Path of the content document inside the package
    pub document: String,
    pub node: NodePath,
    pub target: AtomTarget,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}/{}", self.document, self.node, self.target)
    }
}

/// Lifecycle of an atom within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomStatus {
    Pending,
    InBatch,
    Translated,
    Failed,
}

/// The unit of translation: one text run or one alt value
#[derive(Debug, Clone)]
pub struct Atom {
    /// Book-order id, starting at 1
    pub id: usize,
    pub locator: Locator,
    /// Decoded text including its surrounding whitespace
    pub source_text: String,
    pub translated_text: Option<String>,
    pub status: AtomStatus,
}

impl Atom {
    pub fn new(id: usize, locator: Locator, source_text: String) -> Self {
        Self {
            id,
            locator,
            source_text,
            translated_text: None,
            status: AtomStatus::Pending,
        }
    }

    /// The text actually sent for translation, without its whitespace framing
    pub fn core_text(&self) -> &str {
        self.source_text.trim_matches(XML_WHITESPACE)
    }

    /// Length counted against the per-call budget
    pub fn char_count(&self) -> usize {
        self.core_text().chars().count()
    }

    pub fn mark_in_batch(&mut self) {
        if self.status == AtomStatus::Pending {
            self.status = AtomStatus::InBatch;
        }
    }

    pub fn mark_translated(&mut self, text: String) {
        self.translated_text = Some(text);
        self.status = AtomStatus::Translated;
    }

    pub fn mark_failed(&mut self) {
        self.translated_text = None;
        self.status = AtomStatus::Failed;
    }

    /// Back to pending after its batch was cancelled before dispatch
    pub fn release(&mut self) {
        if self.status == AtomStatus::InBatch {
            self.status = AtomStatus::Pending;
        }
    }

    pub fn is_translated(&self) -> bool {
        self.status == AtomStatus::Translated && self.translated_text.is_some()
    }
}
