//! Filter predicates and the Filter Extractor
//!
//! The generator emits either `["no"]` or `["yes", [table, column, predicate], ...]`.
//! A nested variant `["yes", [[...], [...]]]` also shows up; both collapse to
//! [`FilterList::Filters`] at this typed boundary.

use crate::catalog::KnowledgeCatalog;
use crate::column_selector::ColumnSelectionRow;
use crate::error::Result;
use crate::llm::{ChatPrompt, TextGenerator};
use crate::normalizer::{field_text, normalize};
use crate::prompts::FILTER_SYSTEM_PROMPT;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const FILTERS_PRESENT_TAG: &str = "yes";
pub const NO_FILTERS_TAG: &str = "no";

lazy_static! {
    static ref HAS_ALPHA: Regex = Regex::new(r"[A-Za-z]").unwrap();
    static ref RANGE_MARKERS: Regex =
        Regex::new(r"(?i)\bbetween\b|<=|>=|<|>|\bbefore\b|\bafter\b|\d{4}-\d{2}-\d{2}").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub table: String,
    pub column: String,
    pub predicate: String,
}

impl FilterPredicate {
    pub fn class(&self) -> PredicateClass {
        classify(&self.predicate)
    }

    /// Column name without a leading `<table>.` qualifier for this table.
    pub fn bare_column(&self) -> &str {
        strip_table_prefix(&self.table, &self.column)
    }

    /// Same table and column, new value.
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            table: self.table.clone(),
            column: self.column.clone(),
            predicate: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateClass {
    /// Plain value compared by (fuzzy) equality.
    Categorical,
    /// Range, comparison, date or numeric expression; never rewritten.
    Range,
}

/// Drop a `table.` qualifier from `column` when it names `table`.
pub fn strip_table_prefix<'a>(table: &str, column: &'a str) -> &'a str {
    let column = column.trim();
    match column.split_once('.') {
        Some((qualifier, rest)) if qualifier.trim().eq_ignore_ascii_case(table.trim()) => rest.trim(),
        _ => column,
    }
}

/// Lexical classification of a predicate string.
pub fn classify(predicate: &str) -> PredicateClass {
    if HAS_ALPHA.is_match(predicate) && !RANGE_MARKERS.is_match(predicate) {
        PredicateClass::Categorical
    } else {
        PredicateClass::Range
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "predicates", rename_all = "snake_case")]
pub enum FilterList {
    NoFilters,
    Filters(Vec<FilterPredicate>),
}

impl FilterList {
    pub fn predicates(&self) -> &[FilterPredicate] {
        match self {
            FilterList::NoFilters => &[],
            FilterList::Filters(predicates) => predicates,
        }
    }

    /// Build from normalized generator output. Anything without the `yes`
    /// tag, or without a single well-formed predicate, means no filters.
    pub fn from_values(values: &[Value]) -> Self {
        let tagged = matches!(
            values.first(),
            Some(Value::String(tag)) if tag.trim().eq_ignore_ascii_case(FILTERS_PRESENT_TAG)
        );
        if !tagged {
            return FilterList::NoFilters;
        }

        let predicates: Vec<FilterPredicate> = flatten_shape(&values[1..])
            .into_iter()
            .filter_map(predicate_from_value)
            .collect();

        if predicates.is_empty() {
            FilterList::NoFilters
        } else {
            FilterList::Filters(predicates)
        }
    }

    /// Tagged wire form: `["no"]` or `["yes", [t, c, v], ...]`.
    pub fn to_value(&self) -> Value {
        match self {
            FilterList::NoFilters => json!([NO_FILTERS_TAG]),
            FilterList::Filters(predicates) => {
                let mut items = vec![json!(FILTERS_PRESENT_TAG)];
                items.extend(
                    predicates
                        .iter()
                        .map(|p| json!([p.table, p.column, p.predicate])),
                );
                Value::Array(items)
            }
        }
    }
}

impl fmt::Display for FilterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Collapse `[[[t,c,v], ...]]` (one nested list after the tag) to `[[t,c,v], ...]`.
fn flatten_shape(rest: &[Value]) -> Vec<&Value> {
    match rest {
        [Value::Array(inner)] if !inner.is_empty() && inner.iter().all(Value::is_array) => {
            inner.iter().collect()
        }
        _ => rest.iter().collect(),
    }
}

fn predicate_from_value(value: &Value) -> Option<FilterPredicate> {
    let fields = value.as_array()?;
    if fields.len() < 3 {
        return None;
    }
    let predicate = FilterPredicate {
        table: field_text(&fields[0]),
        column: field_text(&fields[1]),
        predicate: field_text(&fields[2]),
    };
    if predicate.table.is_empty() || predicate.column.is_empty() || predicate.predicate.is_empty() {
        return None;
    }
    Some(predicate)
}

pub struct FilterExtractor {
    generator: Arc<dyn TextGenerator>,
}

impl FilterExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn prompt(&self, question: &str, columns_with_samples: &str) -> ChatPrompt {
        ChatPrompt::new(
            FILTER_SYSTEM_PROMPT,
            format!(
                "User question:\n{}\n\nAvailable tables and columns (with sample values):\n{}",
                question, columns_with_samples
            ),
        )
    }

    pub async fn extract_filters(&self, question: &str, columns_with_samples: &str) -> Result<FilterList> {
        let raw = self
            .generator
            .generate(&self.prompt(question, columns_with_samples))
            .await?;
        debug!(response = %raw, "filter extractor response");

        let filters = FilterList::from_values(&normalize(&raw));
        info!(count = filters.predicates().len(), "extracted filters");
        Ok(filters)
    }
}

/// Catalog descriptors (with sample values) for each selected column,
/// deduplicated, in selection order. Columns the catalog does not know are
/// listed with the selector's justification instead.
pub fn columns_with_samples(catalog: &KnowledgeCatalog, rows: &[ColumnSelectionRow]) -> String {
    let mut seen = HashSet::new();
    let mut listed = Vec::new();
    for row in rows {
        if !seen.insert((row.table.clone(), row.column.clone())) {
            continue;
        }
        let bare = row.column.rsplit('.').next().unwrap_or(&row.column);
        let described = catalog
            .entry(&row.table)
            .ok()
            .and_then(|entry| entry.column(bare));
        listed.push(match described {
            Some(column) => json!({
                "table": row.table,
                "column": column.name,
                "description": column.description,
                "sample_values": column.sample_values,
            }),
            None => json!({
                "table": row.table,
                "column": row.column,
                "description": row.justification,
                "sample_values": [],
            }),
        });
    }
    serde_json::to_string_pretty(&listed).unwrap_or_else(|_| "[]".to_string())
}
