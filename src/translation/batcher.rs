/*!
 * Greedy batching of atoms under a character budget.
 */

use std::ops::Range;

use super::atom::Atom;

/// A contiguous run of atoms sent in one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 0-based position in the plan
    pub index: usize,
    /// Positions in the atom slice the plan was built from
    pub atoms: Range<usize>,
    /// Characters of trimmed source text in this batch
    pub chars: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

/// Split atoms into batches of at most `max_chars` characters.
///
/// Deterministic: atoms are taken in order and a batch is closed as soon as
/// the next atom would overflow it. An atom longer than the whole budget
/// gets a batch of its own rather than being split or dropped.
pub fn plan_batches(atoms: &[Atom], max_chars: usize) -> Vec<Batch> {
    let budget = max_chars.max(1);
    let mut batches = Vec::new();
    let mut start = 0;
    let mut chars = 0;

    for (position, atom) in atoms.iter().enumerate() {
        let size = atom.char_count();
        if position > start && chars + size > budget {
            batches.push(Batch {
                index: batches.len(),
                atoms: start..position,
                chars,
            });
            start = position;
            chars = 0;
        }
        chars += size;
    }

    if start < atoms.len() {
        batches.push(Batch {
            index: batches.len(),
            atoms: start..atoms.len(),
            chars,
        });
    }
    batches
}
