//! Fuzzy Value Resolver
//!
//! Rewrites categorical filter values to the closest value actually stored in
//! the target column. Range and date predicates pass through untouched, as do
//! table and column names.

use crate::error::{NlqError, Result};
use crate::filters::{FilterList, FilterPredicate, PredicateClass};
use crate::fuzzy_matcher::FuzzyMatcher;
use crate::parallel::OrderedParallelExecutor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read access to the distinct stored values of a column.
#[async_trait]
pub trait ValueSource: Send + Sync {
    /// Distinct non-null values of `table.column`, as text.
    async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>>;
}

/// In-memory value source keyed by (table, column).
#[derive(Debug, Default, Clone)]
pub struct StaticValueSource {
    values: HashMap<(String, String), Vec<String>>,
}

impl StaticValueSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(mut self, table: &str, column: &str, values: &[&str]) -> Self {
        self.values.insert(
            (table.to_string(), column.to_string()),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl ValueSource for StaticValueSource {
    async fn distinct_values(&self, table: &str, column: &str) -> Result<Vec<String>> {
        Ok(self
            .values
            .get(&(table.to_string(), column.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Source with no stored values; every categorical predicate stays as extracted.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyValueSource;

#[async_trait]
impl ValueSource for EmptyValueSource {
    async fn distinct_values(&self, _table: &str, _column: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub struct FuzzyValueResolver {
    source: Arc<dyn ValueSource>,
    matcher: FuzzyMatcher,
    min_score: Option<f64>,
}

impl FuzzyValueResolver {
    pub fn new(source: Arc<dyn ValueSource>, matcher: FuzzyMatcher) -> Self {
        Self {
            source,
            matcher,
            min_score: None,
        }
    }

    /// Keep the extracted literal when the best match scores below `score`.
    pub fn with_min_score(mut self, score: Option<f64>) -> Self {
        self.min_score = score;
        self
    }

    pub async fn resolve(&self, filters: &FilterList, executor: &OrderedParallelExecutor) -> Result<FilterList> {
        let predicates = match filters {
            FilterList::NoFilters => return Ok(FilterList::NoFilters),
            FilterList::Filters(predicates) => predicates.clone(),
        };

        let matcher = self.matcher.clone();
        let min_score = self.min_score;
        let resolved = executor
            .map(predicates, |_, predicate| {
                let source = Arc::clone(&self.source);
                let matcher = matcher.clone();
                async move {
                    resolve_one(source.as_ref(), &matcher, min_score, predicate).await
                }
            })
            .await?;

        let changed = resolved
            .iter()
            .zip(filters.predicates())
            .filter(|(after, before)| after.predicate != before.predicate)
            .count();
        info!(predicates = resolved.len(), changed, "resolved filter values");
        Ok(FilterList::Filters(resolved))
    }
}

async fn resolve_one(
    source: &dyn ValueSource,
    matcher: &FuzzyMatcher,
    min_score: Option<f64>,
    predicate: FilterPredicate,
) -> Result<FilterPredicate> {
    if predicate.class() == PredicateClass::Range {
        return Ok(predicate);
    }

    let stored = match source.distinct_values(&predicate.table, predicate.bare_column()).await {
        Ok(stored) => stored,
        // Names that cannot be looked up are generator noise, not a failed run
        Err(NlqError::InvalidInput(reason)) => {
            warn!(
                table = %predicate.table,
                column = %predicate.column,
                %reason,
                "cannot look up stored values, keeping literal"
            );
            return Ok(predicate);
        }
        Err(NlqError::Database(msg)) => {
            return Err(NlqError::Database(format!(
                "distinct values for {}.{}: {}",
                predicate.table, predicate.column, msg
            )))
        }
        Err(other) => return Err(other),
    };
    if stored.is_empty() {
        debug!(table = %predicate.table, column = %predicate.column, "no stored values, keeping literal");
        return Ok(predicate);
    }

    let outcome = matcher.best_match(&predicate.predicate, &stored);
    if let Some(min) = min_score {
        if outcome.score < min {
            debug!(
                literal = %predicate.predicate,
                candidate = %outcome.value,
                score = outcome.score,
                "best match below minimum score, keeping literal"
            );
            return Ok(predicate);
        }
    }

    debug!(
        literal = %predicate.predicate,
        matched = %outcome.value,
        score = outcome.score,
        "matched filter value"
    );
    Ok(predicate.with_value(outcome.value))
}
