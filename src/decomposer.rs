//! Sub-question Decomposer
//!
//! Splits a question into minimal sub-questions and assigns each one to the
//! single best-fit table. Output order is the generator's order and is kept:
//! column selection iterates in this order and the run trace reports it.

use crate::catalog::KnowledgeCatalog;
use crate::error::Result;
use crate::llm::{ChatPrompt, TextGenerator};
use crate::normalizer::{normalize, normalize_pairs};
use crate::prompts::{DECOMPOSER_CONTEXT, DECOMPOSER_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubquestionAssignment {
    pub subquestion: String,
    pub table: String,
}

pub struct Decomposer {
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<KnowledgeCatalog>,
}

impl Decomposer {
    pub fn new(generator: Arc<dyn TextGenerator>, catalog: Arc<KnowledgeCatalog>) -> Self {
        Self { generator, catalog }
    }

    pub fn prompt(&self, question: &str, tables: &[String]) -> Result<ChatPrompt> {
        let slice = self.catalog.description_slice(tables)?;
        Ok(ChatPrompt::new(
            DECOMPOSER_SYSTEM_PROMPT,
            format!(
                "CONTEXT:\n{}\n\nTable list:\n{}\n\nUser question:\n{}",
                DECOMPOSER_CONTEXT, slice, question
            ),
        ))
    }

    pub async fn decompose(&self, question: &str, tables: &[String]) -> Result<Vec<SubquestionAssignment>> {
        let prompt = self.prompt(question, tables)?;
        let raw = self.generator.generate(&prompt).await?;
        debug!(response = %raw, "decomposer response");

        let assignments = parse_assignments(&raw.replace(['\n', '\r'], ""));
        info!(count = assignments.len(), "decomposed question into sub-questions");
        Ok(assignments)
    }
}

/// Normalize decomposer output into well-formed assignments, order preserved.
pub fn parse_assignments(raw: &str) -> Vec<SubquestionAssignment> {
    normalize_pairs(&normalize(raw))
        .into_iter()
        .map(|(subquestion, table)| SubquestionAssignment { subquestion, table })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        response: String,
        seen: Mutex<Vec<ChatPrompt>>,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
            self.seen.lock().unwrap().push(prompt.clone());
            Ok(self.response.clone())
        }
    }

    fn catalog() -> Arc<KnowledgeCatalog> {
        Arc::new(KnowledgeCatalog::new(vec![
            CatalogEntry {
                table: "orders".into(),
                description: "orders with timestamps".into(),
                columns: vec![],
            },
            CatalogEntry {
                table: "order_payments".into(),
                description: "payments per order".into(),
                columns: vec![],
            },
        ]))
    }

    #[test]
    fn test_parse_assignments_preserves_order_and_drops_malformed() {
        let raw = r#"[["total sales per month", "order_payments"], ["", "orders"], ["purchase month", "orders"], ["x"]]"#;
        let parsed = parse_assignments(raw);
        assert_eq!(
            parsed,
            vec![
                SubquestionAssignment {
                    subquestion: "total sales per month".into(),
                    table: "order_payments".into()
                },
                SubquestionAssignment {
                    subquestion: "purchase month".into(),
                    table: "orders".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_assignments_empty_on_garbage() {
        assert!(parse_assignments("I cannot answer this.").is_empty());
        assert!(parse_assignments("[]").is_empty());
    }

    #[tokio::test]
    async fn test_decompose_sends_description_slice_only() {
        let generator = Arc::new(Recording {
            response: "[['monthly sales',\n 'order_payments']]".into(),
            seen: Mutex::new(Vec::new()),
        });
        let decomposer = Decomposer::new(generator.clone(), catalog());
        let out = decomposer
            .decompose("What is the monthly trend of total sales?", &["order_payments".into()])
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].table, "order_payments");

        let seen = generator.seen.lock().unwrap();
        assert!(seen[0].user.contains("payments per order"));
        assert!(!seen[0].user.contains("orders with timestamps"));
    }

    #[tokio::test]
    async fn test_decompose_rejects_unknown_table_in_slice() {
        let generator = Arc::new(Recording {
            response: "[]".into(),
            seen: Mutex::new(Vec::new()),
        });
        let decomposer = Decomposer::new(generator, catalog());
        assert!(decomposer.decompose("q", &["sellers".into()]).await.is_err());
    }
}
