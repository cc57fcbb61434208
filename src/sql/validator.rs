use super::SqlContext;
use crate::error::Result;
use crate::llm::{ChatPrompt, TextGenerator};
use crate::normalizer::extract_statement;
use crate::prompts::validator_system_prompt;
use std::sync::Arc;
use tracing::{debug, info};

/// Reviews a candidate statement under the fixed rule set and returns the
/// statement to run. A compliant candidate is expected back unchanged.
pub struct SqlValidator {
    generator: Arc<dyn TextGenerator>,
}

impl SqlValidator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn prompt(&self, context: &SqlContext<'_>, candidate: &str) -> ChatPrompt {
        ChatPrompt::new(
            validator_system_prompt(),
            format!("{}\n\nSQL to validate:\n{}", context.render(), candidate),
        )
    }

    pub async fn validate(&self, context: &SqlContext<'_>, candidate: &str) -> Result<String> {
        let raw = self.generator.generate(&self.prompt(context, candidate)).await?;
        debug!(response = %raw, "validator response");

        let sql = extract_statement(&raw, "sql");
        if sql != candidate.trim() {
            info!("validator rewrote the candidate statement");
        }
        Ok(sql)
    }
}
