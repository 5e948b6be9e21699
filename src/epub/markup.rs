/*!
 * Byte-preserving markup model for XHTML content documents.
 *
 * A document is kept as its original text. Tokenizing records the byte range
 * of every translatable region (direct text runs of rendered elements and
 * `alt` values of image elements), so writing back only rewrites those ranges
 * and never reformats the markup around them.
 */

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use quick_xml::escape::{escape, partial_escape, resolve_html5_entity, unescape_with};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::errors::MarkupError;

/// Elements whose whole subtree is never rendered as prose
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head", "svg", "math", "template"];

/// Elements whose `alt` attribute is translatable
const IMAGE_ELEMENTS: &[&str] = &["img", "area"];

/// HTML elements that never have content, even when written without `/>`
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Whitespace as XML defines it; anything else is content
pub const XML_WHITESPACE: &[char] = &[' ', '\t', '\n', '\r'];

/// One step of a node path: element name and 1-based position among element siblings
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathStep {
    pub name: String,
    pub position: usize,
}

/// Address of an element inside a document, from the root down
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<PathStep>);

impl NodePath {
    fn child(&self, name: &str, position: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(PathStep {
            name: name.to_string(),
            position,
        });
        Self(steps)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            write!(f, "/{}[{}]", step.name, step.position)?;
        }
        Ok(())
    }
}

/// Which part of an element a translatable region belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AtomTarget {
    /// The n-th (1-based) direct text run of the element
    TextContent { run: usize },
    /// The element's `alt` attribute value
    AltAttribute,
}

impl fmt::Display for AtomTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextContent { run } => write!(f, "text()[{}]", run),
            Self::AltAttribute => write!(f, "@alt"),
        }
    }
}

/// A translatable region of the source text
#[derive(Debug, Clone)]
pub struct Slot {
    pub path: NodePath,
    pub target: AtomTarget,
    /// Byte range of the raw (still escaped) region
    pub span: Range<usize>,
    /// False for unquoted attribute values, which need quotes once rewritten
    pub quoted: bool,
}

/// Parsed content document: original text plus its translatable slots
#[derive(Debug, Clone)]
pub struct MarkupTree {
    source: String,
    slots: Vec<Slot>,
    index: HashMap<(NodePath, AtomTarget), usize>,
}

// Open element on the tokenizer stack
struct Frame {
    name: String,
    path: NodePath,
    children: usize,
    runs: usize,
    skipped: bool,
}

impl MarkupTree {
    /// Tokenize a document, recording its translatable slots
    pub fn parse(source: String) -> Result<Self, MarkupError> {
        let slots = tokenize(&source)?;
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| ((slot.path.clone(), slot.target), i))
            .collect();

        Ok(Self {
            source,
            slots,
            index,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Find the slot addressed by a node path and target
    pub fn lookup(&self, path: &NodePath, target: AtomTarget) -> Option<usize> {
        self.index.get(&(path.clone(), target)).copied()
    }

    /// Raw text of a slot exactly as it appears in the document
    pub fn raw(&self, slot: usize) -> Option<&str> {
        self.slots.get(slot).map(|s| &self.source[s.span.clone()])
    }

    /// Text of a slot with entity and character references resolved
    pub fn decoded(&self, slot: usize) -> Option<Cow<'_, str>> {
        self.raw(slot).map(decode)
    }

    /// Replace the trimmed core of each listed slot with new text.
    ///
    /// The raw whitespace framing the core is kept byte for byte; the new
    /// text is escaped for its context. Slots are re-tokenized afterwards.
    pub fn rewrite(&mut self, replacements: &[(usize, String)]) -> Result<(), MarkupError> {
        if replacements.is_empty() {
            return Ok(());
        }

        let mut edits = Vec::with_capacity(replacements.len());
        for (slot_index, text) in replacements {
            let slot = self.slots.get(*slot_index).ok_or_else(|| MarkupError::Parse {
                position: 0,
                message: format!("no translatable slot #{}", slot_index),
            })?;
            let raw = &self.source[slot.span.clone()];
            let (lead_len, trail_len) = whitespace_framing(raw);
            let (lead, trail) = (&raw[..lead_len], &raw[raw.len() - trail_len..]);

            let body = match slot.target {
                AtomTarget::TextContent { .. } => partial_escape(text.as_str()),
                AtomTarget::AltAttribute => escape(text.as_str()),
            };
            let replacement = if slot.quoted {
                format!("{}{}{}", lead, body, trail)
            } else {
                format!("\"{}{}{}\"", lead, body, trail)
            };
            edits.push((slot.span.clone(), replacement));
        }
        edits.sort_by_key(|(span, _)| span.start);

        let mut output = String::with_capacity(self.source.len());
        let mut cursor = 0;
        for (span, replacement) in edits {
            if span.start < cursor {
                continue;
            }
            output.push_str(&self.source[cursor..span.start]);
            output.push_str(&replacement);
            cursor = span.end;
        }
        output.push_str(&self.source[cursor..]);

        *self = Self::parse(output)?;
        Ok(())
    }
}

/// Resolve entity and character references.
///
/// A bare `&` or a reference that does not resolve stays literal text; the
/// references around it are still resolved.
pub fn decode(raw: &str) -> Cow<'_, str> {
    if let Ok(text) = unescape_with(raw, resolve_html5_entity) {
        return text;
    }

    let mut text = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        text.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let resolved = reference_len(rest).and_then(|len| resolve_reference(&rest[..len]).map(|r| (len, r)));
        match resolved {
            Some((len, reference)) => {
                text.push_str(&reference);
                rest = &rest[len..];
            }
            None => {
                text.push('&');
                rest = &rest[1..];
            }
        }
    }
    text.push_str(rest);
    Cow::Owned(text)
}

/// Length of the `&name;` reference `raw` starts with
fn reference_len(raw: &str) -> Option<usize> {
    let end = raw.find(';')?;
    let name = raw.get(1..end)?;
    if name.is_empty() || name.contains(['&', '<']) || name.contains(XML_WHITESPACE) {
        return None;
    }
    Some(end + 1)
}

fn resolve_reference(reference: &str) -> Option<Cow<'_, str>> {
    unescape_with(reference, resolve_html5_entity).ok()
}

fn is_whitespace_reference(reference: &str) -> bool {
    resolve_reference(reference)
        .is_some_and(|text| !text.is_empty() && text.chars().all(|c| XML_WHITESPACE.contains(&c)))
}

/// Byte lengths of the leading and trailing whitespace of a raw region.
///
/// References that resolve to whitespace count as whitespace, so the framing
/// matches what trimming the decoded text removes.
fn whitespace_framing(raw: &str) -> (usize, usize) {
    let mut start = 0;
    while let Some(len) = leading_whitespace(&raw[start..]) {
        start += len;
    }
    if start == raw.len() {
        return (raw.len(), 0);
    }

    let mut end = raw.len();
    while let Some(len) = trailing_whitespace(&raw[start..end]) {
        end -= len;
    }
    (start, raw.len() - end)
}

fn leading_whitespace(raw: &str) -> Option<usize> {
    let first = raw.chars().next()?;
    if XML_WHITESPACE.contains(&first) {
        return Some(first.len_utf8());
    }
    if first != '&' {
        return None;
    }
    let len = reference_len(raw)?;
    is_whitespace_reference(&raw[..len]).then_some(len)
}

fn trailing_whitespace(raw: &str) -> Option<usize> {
    let last = raw.chars().next_back()?;
    if XML_WHITESPACE.contains(&last) {
        return Some(last.len_utf8());
    }
    if last != ';' {
        return None;
    }
    let amp = raw.rfind('&')?;
    let reference = &raw[amp..];
    (reference_len(reference) == Some(reference.len()) && is_whitespace_reference(reference))
        .then_some(reference.len())
}

fn local_name(name: &str) -> String {
    name.rsplit(':').next().unwrap_or(name).to_ascii_lowercase()
}

fn tokenize(source: &str) -> Result<Vec<Slot>, MarkupError> {
    let mut reader = Reader::from_str(source);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.expand_empty_elements = false;
    }

    let mut slots = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut roots = 0usize;

    loop {
        let start = reader.buffer_position() as usize;
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(MarkupError::Parse {
                    position: reader.error_position() as usize,
                    message: e.to_string(),
                });
            }
        };
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(tag) | Event::Empty(tag) if end > start => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                let local = local_name(&name);
                let self_closing = source[start..end].ends_with("/>");

                let (path, parent_skipped) = match stack.last_mut() {
                    Some(parent) => {
                        parent.children += 1;
                        (parent.path.child(&name, parent.children), parent.skipped)
                    }
                    None => {
                        roots += 1;
                        (NodePath::default().child(&name, roots), false)
                    }
                };
                let skipped = parent_skipped || SKIPPED_ELEMENTS.contains(&local.as_str());

                if !skipped && IMAGE_ELEMENTS.contains(&local.as_str()) {
                    if let Some((span, quoted)) = attribute_value_span(source, start..end, "alt") {
                        slots.push(Slot {
                            path: path.clone(),
                            target: AtomTarget::AltAttribute,
                            span,
                            quoted,
                        });
                    }
                }

                if !self_closing && !VOID_ELEMENTS.contains(&local.as_str()) {
                    stack.push(Frame {
                        name,
                        path,
                        children: 0,
                        runs: 0,
                        skipped,
                    });
                }
            }
            Event::End(tag) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                if let Some(position) = stack.iter().rposition(|frame| frame.name == name) {
                    stack.truncate(position);
                }
            }
            Event::Text(_) => {
                if let Some(frame) = stack.last_mut() {
                    frame.runs += 1;
                    if !frame.skipped && end > start {
                        slots.push(Slot {
                            path: frame.path.clone(),
                            target: AtomTarget::TextContent { run: frame.runs },
                            span: start..end,
                            quoted: true,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(slots)
}

/// Locate the raw value of an attribute inside a start tag.
///
/// Returns the absolute byte range of the value (without quotes) and whether
/// it was quoted.
fn attribute_value_span(source: &str, tag: Range<usize>, wanted: &str) -> Option<(Range<usize>, bool)> {
    let raw = &source[tag.clone()];
    let bytes = raw.as_bytes();
    let len = bytes.len();
    let is_space = |b: u8| b.is_ascii_whitespace();

    // element name
    let mut i = 1;
    while i < len && !is_space(bytes[i]) && !matches!(bytes[i], b'>' | b'/') {
        i += 1;
    }

    loop {
        while i < len && is_space(bytes[i]) {
            i += 1;
        }
        if i >= len || matches!(bytes[i], b'>' | b'/') {
            return None;
        }

        let name_start = i;
        while i < len && !is_space(bytes[i]) && !matches!(bytes[i], b'=' | b'>' | b'/') {
            i += 1;
        }
        let name = &raw[name_start..i];
        if i == name_start {
            // stray delimiter
            i += 1;
            continue;
        }

        while i < len && is_space(bytes[i]) {
            i += 1;
        }
        if i >= len || bytes[i] != b'=' {
            continue;
        }
        i += 1;
        while i < len && is_space(bytes[i]) {
            i += 1;
        }
        if i >= len {
            return None;
        }

        let (value, quoted) = if bytes[i] == b'"' || bytes[i] == b'\'' {
            let quote = bytes[i] as char;
            let value_start = i + 1;
            let value_end = value_start + raw[value_start..].find(quote)?;
            i = value_end + 1;
            (value_start..value_end, true)
        } else {
            let value_start = i;
            while i < len && !is_space(bytes[i]) && bytes[i] != b'>' {
                i += 1;
            }
            (value_start..i, false)
        };

        if local_name(name) == wanted {
            return Some((tag.start + value.start..tag.start + value.end, quoted));
        }
    }
}
