/*!
 * EPUB container handling.
 *
 * - `container`: package model, reading order and document encodings
 * - `markup`: byte-preserving tokenizer for content documents
 * - `extractor`: turns documents into an ordered atom stream
 * - `reinjector`: writes translations back at their locators
 * - `repackager`: atomically writes the output container
 */

pub mod container;
pub mod extractor;
pub mod markup;
pub mod reinjector;
pub mod repackager;

pub use self::container::{ContentDocument, Package};
pub use self::extractor::AtomExtractor;
pub use self::reinjector::Reinjector;
pub use self::repackager::Repackager;
