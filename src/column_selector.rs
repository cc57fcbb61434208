//! Column Selector
//!
//! For each sub-question assignment, asks the generator which of the assigned
//! table's columns are needed. Assignments run concurrently; the accumulated
//! rows follow assignment order, then pair order within an assignment.
//! Duplicates across assignments are kept.

use crate::catalog::KnowledgeCatalog;
use crate::decomposer::SubquestionAssignment;
use crate::error::{NlqError, Result};
use crate::llm::{ChatPrompt, TextGenerator};
use crate::normalizer::{extract_nested_array, normalize, normalize_pairs};
use crate::parallel::OrderedParallelExecutor;
use crate::prompts::{column_selector_system_prompt, EXCLUDED_COLUMN};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TABLE_MARKER_PREFIX: &str = "name of table:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelectionRow {
    pub table: String,
    pub column: String,
    pub justification: String,
}

impl ColumnSelectionRow {
    pub fn marker(&self) -> String {
        format!("{}{}", TABLE_MARKER_PREFIX, self.table)
    }

    /// `[marker, column, justification]`, the shape the SQL stages read.
    pub fn as_triple(&self) -> [String; 3] {
        [self.marker(), self.column.clone(), self.justification.clone()]
    }
}

/// Serialize rows as a JSON array of triples for prompt context.
pub fn render_rows(rows: &[ColumnSelectionRow]) -> String {
    let triples: Vec<[String; 3]> = rows.iter().map(ColumnSelectionRow::as_triple).collect();
    serde_json::to_string(&triples).unwrap_or_else(|_| "[]".to_string())
}

#[derive(Clone)]
pub struct ColumnSelector {
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<KnowledgeCatalog>,
}

impl ColumnSelector {
    pub fn new(generator: Arc<dyn TextGenerator>, catalog: Arc<KnowledgeCatalog>) -> Self {
        Self { generator, catalog }
    }

    pub fn prompt(&self, main_question: &str, sub_question: &str, table: &str) -> Result<ChatPrompt> {
        let columns = self.catalog.render_columns(table)?;
        Ok(ChatPrompt::new(
            column_selector_system_prompt(),
            format!(
                "Column list:\n{}\n\nSub-question:\n{}\n\nMain question:\n{}",
                columns, sub_question, main_question
            ),
        ))
    }

    /// Columns (name, justification) chosen for one sub-question.
    pub async fn select_columns(
        &self,
        main_question: &str,
        sub_question: &str,
        table: &str,
    ) -> Result<Vec<(String, String)>> {
        let prompt = self.prompt(main_question, sub_question, table)?;
        let raw = self.generator.generate(&prompt).await?;
        debug!(table, response = %raw, "column selector response");

        let flat = raw.replace(['\n', '\r'], "");
        let fragment = extract_nested_array(&flat).unwrap_or("[]");
        let pairs = normalize_pairs(&normalize(fragment))
            .into_iter()
            .filter(|(column, _)| {
                let excluded = is_excluded(column);
                if excluded {
                    warn!(table, column = %column, "dropping excluded column from selection");
                }
                !excluded
            })
            .collect();
        Ok(pairs)
    }

    /// Run selection for every assignment and accumulate rows in order.
    pub async fn select_all(
        &self,
        main_question: &str,
        assignments: &[SubquestionAssignment],
        executor: &OrderedParallelExecutor,
    ) -> Result<Vec<ColumnSelectionRow>> {
        // Unknown tables fail before any generation call is made
        for assignment in assignments {
            self.catalog.entry(&assignment.table)?;
        }

        let main_question = Arc::new(main_question.to_string());
        let per_assignment = executor
            .map(assignments.to_vec(), |_, assignment| {
                let selector = self.clone();
                let main_question = Arc::clone(&main_question);
                async move {
                    let pairs = selector
                        .select_columns(&main_question, &assignment.subquestion, &assignment.table)
                        .await?;
                    Ok::<_, NlqError>(pairs
                        .into_iter()
                        .map(|(column, justification)| ColumnSelectionRow {
                            table: assignment.table.clone(),
                            column,
                            justification,
                        })
                        .collect::<Vec<_>>())
                }
            })
            .await?;

        let rows: Vec<ColumnSelectionRow> = per_assignment.into_iter().flatten().collect();
        info!(assignments = assignments.len(), rows = rows.len(), "selected columns");
        Ok(rows)
    }
}

fn is_excluded(column: &str) -> bool {
    let bare = column.rsplit('.').next().unwrap_or(column).trim();
    bare.eq_ignore_ascii_case(EXCLUDED_COLUMN)
}
