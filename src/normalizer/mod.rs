//! Output Normalizer
//!
//! Turns raw generator text into structured values. The generator is told to
//! emit strict JSON but routinely adds prose, single quotes or code fences, so
//! parsing degrades step by step instead of failing:
//!
//! 1. strict JSON
//! 2. list-literal syntax (see [`literal`])
//! 3. lenient fallback: regex-recover the first array of arrays, then retry (2)
//! 4. empty sequence

pub mod literal;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

lazy_static! {
    static ref NESTED_ARRAY: Regex =
        Regex::new(r"(?s)\[\s*\[.*?\]\s*(,\s*\[.*?\]\s*)*\]").unwrap();
    static ref ANY_FENCE: Regex = Regex::new(r"(?s)```(.*?)```").unwrap();
    static ref FENCE_INFO: Regex = Regex::new(r"^[ \t]*([A-Za-z][A-Za-z0-9_+.-]*)[ \t]*\r?\n").unwrap();
    static ref SELECT_KEYWORD: Regex = Regex::new(r"(?i)\bselect\b").unwrap();
    static ref CTE_HEAD: Regex = Regex::new(
        r"(?is)\bwith\s+(recursive\s+)?[A-Za-z_][A-Za-z0-9_]*\s*(\([^()]*\))?\s+as\s*\(\s*$"
    )
    .unwrap();
}

/// Parse generator output into a sequence. Never fails; unparseable text
/// yields an empty sequence.
pub fn normalize(raw: &str) -> Vec<Value> {
    let text = raw.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return items;
    }

    if let Ok(Value::Array(items)) = literal::parse_literal(text) {
        return items;
    }

    if let Some(fragment) = extract_nested_array(text) {
        if let Ok(Value::Array(items)) = literal::parse_literal(fragment) {
            debug!("recovered nested array from noisy generator output");
            return items;
        }
    }

    debug!(preview = %preview(text), "generator output could not be parsed as a sequence");
    Vec::new()
}

/// Keep entries that are sequences of at least two non-empty fields, reduced
/// to their first two fields.
pub fn normalize_pairs(entries: &[Value]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Array(fields) if fields.len() >= 2 => {
                let first = field_text(&fields[0]);
                let second = field_text(&fields[1]);
                if first.is_empty() || second.is_empty() {
                    None
                } else {
                    Some((first, second))
                }
            }
            _ => None,
        })
        .collect()
}

/// Render one structured field as trimmed text.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// First top-level array of arrays embedded in noisy text.
pub fn extract_nested_array(text: &str) -> Option<&str> {
    NESTED_ARRAY.find(text).map(|m| m.as_str())
}

/// Extract an executable statement from generator output.
///
/// Preference order: a fenced block tagged `language` (case-insensitive), the
/// first fenced block of any language, then (for `sql`) everything from the
/// first `SELECT` onward, then the trimmed text. A `WITH name AS (` head
/// directly before that `SELECT` is kept so unfenced CTEs stay whole.
pub fn extract_statement(raw: &str, language: &str) -> String {
    if let Some(block) = tagged_fence(raw, language) {
        return block;
    }

    if let Some(caps) = ANY_FENCE.captures(raw) {
        let body = &caps[1];
        let body = match FENCE_INFO.captures(body) {
            Some(info) if !is_statement_keyword(&info[1]) => &body[info.get(0).map_or(0, |m| m.end())..],
            _ => body,
        };
        return body.trim().to_string();
    }

    if language.eq_ignore_ascii_case("sql") {
        if let Some(m) = SELECT_KEYWORD.find(raw) {
            let prefix = &raw[..m.start()];
            let start = CTE_HEAD.find(prefix).map_or(m.start(), |head| head.start());
            return raw[start..].trim().to_string();
        }
    }

    raw.trim().to_string()
}

fn tagged_fence(raw: &str, language: &str) -> Option<String> {
    let pattern = format!(r"(?is)```[ \t]*{}\b(.*?)```", regex::escape(language.trim()));
    let re = Regex::new(&pattern).ok()?;
    re.captures(raw).map(|caps| caps[1].trim().to_string())
}

fn is_statement_keyword(word: &str) -> bool {
    ["select", "with"].iter().any(|k| word.eq_ignore_ascii_case(k))
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}
