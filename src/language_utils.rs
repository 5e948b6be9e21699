/*!
 * Language utilities for target language tags.
 *
 * Target languages are BCP-47-like tags (`fr`, `zh-TW`, `pt_BR`, `yue`). Only
 * the primary subtag is checked against ISO 639; region and script subtags
 * are passed through to the model untouched.
 */

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes and their 639-2/T equivalents
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Split a tag into its lowercased primary subtag and the rest
fn primary_subtag(tag: &str) -> (String, Option<&str>) {
    let tag = tag.trim();
    match tag.split_once(['-', '_']) {
        Some((primary, rest)) => (primary.to_lowercase(), Some(rest)),
        None => (tag.to_lowercase(), None),
    }
}

/// Look up the language of an ISO 639-1 or 639-2 code
fn lookup(code: &str) -> Option<Language> {
    match code.len() {
        2 => Language::from_639_1(code),
        3 => {
            let code = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(b, _)| *b == code)
                .map(|(_, t)| *t)
                .unwrap_or(code);
            Language::from_639_3(code)
        }
        _ => None,
    }
}

/// Validate a target language tag and return the language it names
pub fn validate_language_tag(tag: &str) -> Result<Language> {
    let (primary, rest) = primary_subtag(tag);
    if rest.is_some_and(|r| r.is_empty() || !r.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')) {
        return Err(anyhow!("Invalid language tag: {}", tag));
    }
    lookup(&primary).ok_or_else(|| anyhow!("Invalid language code: {}", tag))
}

/// Human-readable name for a tag, keeping its region (`Chinese (TW)`)
pub fn language_display_name(tag: &str) -> Result<String> {
    let language = validate_language_tag(tag)?;
    let (_, rest) = primary_subtag(tag);
    Ok(match rest {
        Some(region) => format!("{} ({})", language.to_name(), region),
        None => language.to_name().to_string(),
    })
}
