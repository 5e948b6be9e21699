/*!
 * Container round trips: open, extract, reinject and repackage without a provider
 */

use anyhow::Result;
use std::fs;
use zip::CompressionMethod;

use bookwai::epub::{AtomExtractor, Package, Reinjector};
use bookwai::translation::plan_batches;

use crate::common::{self, CHAPTER_ONE, CHAPTER_ONE_PATH, CHAPTER_TWO_PATH, Entry, SampleBook};

#[test]
fn test_identity_reinjection_should_reproduce_every_entry() -> Result<()> {
    let book = SampleBook::new()?;
    let mut package = Package::open(&book.path)?;
    let mut atoms = AtomExtractor::default().extract(&package);
    for atom in atoms.iter_mut() {
        let core = atom.core_text().to_string();
        atom.mark_translated(core);
    }

    assert_eq!(Reinjector::apply_package(&mut package, &atoms)?, 0);
    let output = book.output("identity.epub");
    package.write(&output)?;

    assert_eq!(common::read_zip(&output)?, common::read_zip(&book.path)?);
    Ok(())
}

#[test]
fn test_extract_should_number_atoms_in_spine_order() -> Result<()> {
    let book = SampleBook::new()?;
    let package = Package::open(&book.path)?;
    let atoms = AtomExtractor::default().extract(&package);

    let ids: Vec<usize> = atoms.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    let cores: Vec<&str> = atoms.iter().map(|a| a.core_text()).collect();
    assert_eq!(cores, vec!["Hello", "Goodbye", "It was a", "dark", "night.", "A lighthouse"]);
    assert_eq!(atoms[0].locator.document, CHAPTER_ONE_PATH);
    assert_eq!(atoms[5].locator.document, CHAPTER_TWO_PATH);

    // re-extracting an unmodified package yields the same atoms
    let again = AtomExtractor::default().extract(&Package::open(&book.path)?);
    let pairs = |atoms: &[bookwai::translation::Atom]| -> Vec<(usize, String, String)> {
        atoms
            .iter()
            .map(|a| (a.id, a.locator.to_string(), a.source_text.clone()))
            .collect()
    };
    assert_eq!(pairs(&atoms), pairs(&again));
    Ok(())
}

#[test]
fn test_extract_without_alt_text_should_skip_image_atoms() -> Result<()> {
    let book = SampleBook::new()?;
    let package = Package::open(&book.path)?;
    let atoms = AtomExtractor::new(false).extract(&package);
    assert_eq!(atoms.len(), 5);
    assert!(atoms.iter().all(|a| a.core_text() != "A lighthouse"));
    Ok(())
}

#[test]
fn test_batches_should_cover_sample_atoms_once_within_budget() -> Result<()> {
    let book = SampleBook::new()?;
    let atoms = AtomExtractor::default().extract(&Package::open(&book.path)?);

    for budget in [1, 5, 8, 12, 20, 3500] {
        let batches = plan_batches(&atoms, budget);
        let mut covered = Vec::new();
        for batch in &batches {
            let slice = &atoms[batch.atoms.clone()];
            let chars: usize = slice.iter().map(|a| a.char_count()).sum();
            assert_eq!(chars, batch.chars);
            assert!(chars <= budget || slice.len() == 1, "budget {} exceeded by batch {:?}", budget, batch);
            covered.extend(slice.iter().map(|a| a.id));
        }
        assert_eq!(covered, (1..=atoms.len()).collect::<Vec<_>>());
    }
    Ok(())
}

#[test]
fn test_write_should_move_mimetype_first_and_store_it() -> Result<()> {
    let mut reordered = common::sample_entries();
    let mimetype = reordered.remove(0);
    reordered.push(Entry::deflated(mimetype.name, mimetype.data));
    let book = SampleBook::with_entries(&reordered)?;

    let package = Package::open(&book.path)?;
    let output = book.output("fixed.epub");
    package.write(&output)?;

    let written = common::read_zip(&output)?;
    assert_eq!(written[0].name, "mimetype");
    assert_eq!(written[0].method, CompressionMethod::Stored);
    assert_eq!(written.len(), reordered.len());
    assert_eq!(written.iter().filter(|e| e.name == "mimetype").count(), 1);
    Ok(())
}

#[test]
fn test_write_should_replace_existing_output_without_leftovers() -> Result<()> {
    let book = SampleBook::new()?;
    let output = book.output("out.epub");
    fs::write(&output, b"an older, shorter file")?;

    let mut package = Package::open(&book.path)?;
    let mut atoms = AtomExtractor::default().extract(&package);
    atoms[0].mark_translated("Bonjour".to_string());
    Reinjector::apply_package(&mut package, &atoms)?;
    package.write(&output)?;

    let chapter = common::read_entry_string(&output, CHAPTER_ONE_PATH)?;
    assert_eq!(chapter, CHAPTER_ONE.replace("<h1>Hello</h1>", "<h1>Bonjour</h1>"));

    let leftovers: Vec<_> = fs::read_dir(book.dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn test_undecodable_document_should_pass_through_untouched() -> Result<()> {
    let mut utf16 = vec![0xFF, 0xFE];
    utf16.extend(
        "<?xml version=\"1.0\" encoding=\"UTF-16\"?><html><body><p>Hi</p></body></html>"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes()),
    );
    let mut entries = common::sample_entries();
    entries.push(Entry::deflated("OEBPS/Text/extra.xhtml", &utf16));
    let book = SampleBook::with_entries(&entries)?;

    let mut package = Package::open(&book.path)?;
    assert_eq!(package.passthrough(), &["OEBPS/Text/extra.xhtml".to_string()]);

    let mut atoms = AtomExtractor::default().extract(&package);
    assert_eq!(atoms.len(), 6);
    for atom in atoms.iter_mut() {
        atom.mark_translated("x".to_string());
    }
    Reinjector::apply_package(&mut package, &atoms)?;
    let output = book.output("out.epub");
    package.write(&output)?;

    let written = common::read_zip(&output)?;
    let extra = written
        .iter()
        .find(|e| e.name == "OEBPS/Text/extra.xhtml")
        .map(|e| e.data.clone());
    assert_eq!(extra, Some(utf16));
    Ok(())
}

#[test]
fn test_open_should_reject_non_zip_input() -> Result<()> {
    let book = SampleBook::new()?;
    let bogus = book.dir.path().join("bogus.epub");
    fs::write(&bogus, b"this is not a zip archive")?;
    assert!(Package::open(&bogus).is_err());
    Ok(())
}
