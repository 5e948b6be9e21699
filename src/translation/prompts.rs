/*!
 * Prompt templates and the JSON wire protocol for batch translation.
 *
 * Each batch is sent as a JSON object of `{id, text}` segments and must come
 * back as `{"translations": [{id, text}, ...]}` with exactly the same ids.
 */

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TranslationError;

/// System prompt template for book translation.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Template text with a `{target_language}` placeholder
    template: String,
}

impl PromptTemplate {
    /// The default system prompt for book translation.
    pub const BOOK_TRANSLATOR: &'static str = r#"You are a professional book translator. Translate every segment the user sends into {target_language}.

Rules:
1) Preserve meaning, tone, and literary style.
2) Do NOT add commentary, notes, or explanations.
3) Keep inline punctuation and spacing natural for {target_language}.
4) Return exactly one translation per segment, with the same id, in the same order.
5) Do not translate HTML/XML tags or entities; only translate human-readable text.
6) Keep proper nouns (people, places, organizations, titles) exactly as written in the source, with no translation or transliteration.

Reply with JSON only: {"translations": [{"id": <id>, "text": "<translation>"}]}"#;

    /// Probe system prompt: deliberately small
    pub const PROBE_TRANSLATOR: &'static str = "You are a helpful translator.";

    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    pub fn book_translator() -> Self {
        Self::new(Self::BOOK_TRANSLATOR)
    }

    /// Render the template for a target language
    pub fn render(&self, target_language: &str) -> String {
        self.template.replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::book_translator()
    }
}

/// One segment of a batch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: usize,
    pub text: String,
}

/// Batch request body sent as the user message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub target_language: String,
    pub segments: Vec<Segment>,
}

/// Builds the system and user messages for one batch
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    template: PromptTemplate,
    target_language: String,
}

impl TranslationPromptBuilder {
    pub fn new(template: PromptTemplate, target_language: &str) -> Self {
        Self {
            template,
            target_language: target_language.to_string(),
        }
    }

    pub fn build_system_prompt(&self) -> String {
        self.template.render(&self.target_language)
    }

    /// User message carrying the segments as JSON
    pub fn build_user_prompt(&self, segments: &[Segment]) -> String {
        let request = TranslationRequest {
            target_language: self.target_language.clone(),
            segments: segments.to_vec(),
        };
        let body = serde_json::to_string_pretty(&request).unwrap_or_else(|_| "{}".to_string());
        format!(
            "Translate the {} segments below. Answer with the same number of translations, \
             keyed by the same ids, and nothing else.\n\n{}",
            segments.len(),
            body
        )
    }

    /// Both prompts for a batch
    pub fn build(&self, segments: &[Segment]) -> (String, String) {
        (self.build_system_prompt(), self.build_user_prompt(segments))
    }
}

/// User message for the capability probe
pub fn probe_user_prompt(target_language: &str) -> String {
    format!(
        "Translate the following short line into {}:\nThis is a translation health check for EPUB batch translation.",
        target_language
    )
}

/// Parse and validate a batch response against the segments that were sent.
///
/// Tolerates code fences, prose around the JSON, ids sent back as strings and
/// a bare array instead of the `translations` envelope. Returns translations
/// in request order.
pub fn parse_batch_response(
    response: &str,
    requested: &[Segment],
) -> Result<Vec<Segment>, TranslationError> {
    let value = extract_json(response)
        .ok_or_else(|| TranslationError::MalformedResponse(preview(response)))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("translations") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(TranslationError::MalformedResponse(
                    "missing 'translations' array".to_string(),
                ));
            }
        },
        _ => {
            return Err(TranslationError::MalformedResponse(
                "response is not a JSON object or array".to_string(),
            ));
        }
    };

    let mut returned: HashMap<usize, String> = HashMap::with_capacity(items.len());
    let mut unexpected = Vec::new();
    let wanted: HashSet<usize> = requested.iter().map(|s| s.id).collect();

    for item in items {
        let (id, text) = parse_item(item)?;
        if !wanted.contains(&id) || returned.contains_key(&id) {
            unexpected.push(id);
            continue;
        }
        returned.insert(id, text);
    }

    if items.len() != requested.len() && unexpected.is_empty() {
        return Err(TranslationError::CountMismatch {
            expected: requested.len(),
            actual: items.len(),
        });
    }

    let missing: Vec<usize> = requested
        .iter()
        .map(|s| s.id)
        .filter(|id| !returned.contains_key(id))
        .collect();
    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(TranslationError::IdMismatch {
            missing,
            unexpected,
        });
    }

    requested
        .iter()
        .map(|segment| {
            let text = returned.remove(&segment.id).unwrap_or_default();
            let text = text.trim().to_string();
            if text.is_empty() && !segment.text.trim().is_empty() {
                return Err(TranslationError::EmptyTranslation { id: segment.id });
            }
            Ok(Segment {
                id: segment.id,
                text,
            })
        })
        .collect()
}

fn parse_item(item: &Value) -> Result<(usize, String), TranslationError> {
    let malformed = |what: &str| TranslationError::MalformedResponse(format!("{}: {}", what, item));

    let id = match item.get("id") {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize),
        Some(Value::String(s)) => s.trim().parse::<usize>().ok(),
        _ => None,
    }
    .ok_or_else(|| malformed("translation without a numeric id"))?;

    let text = item
        .get("text")
        .or_else(|| item.get("translation"))
        .or_else(|| item.get("translated"))
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("translation without text"))?;

    Ok((id, text.to_string()))
}

/// Find the JSON payload in a model reply
fn extract_json(response: &str) -> Option<Value> {
    let trimmed = strip_code_fence(response.trim());
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string (```json)
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn preview(text: &str) -> String {
    let snippet: String = text.chars().take(200).collect();
    if snippet.len() < text.len() {
        format!("{}...", snippet)
    } else {
        snippet
    }
}
