use super::SqlContext;
use crate::error::Result;
use crate::llm::{ChatPrompt, TextGenerator};
use crate::normalizer::extract_statement;
use crate::prompts::synthesizer_system_prompt;
use std::sync::Arc;
use tracing::debug;

/// Why the previous attempt was rejected, carried into the next synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFeedback {
    pub previous_sql: String,
    pub reason: String,
}

pub struct SqlSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl SqlSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub fn prompt(&self, context: &SqlContext<'_>, feedback: Option<&RetryFeedback>) -> ChatPrompt {
        let mut user = context.render();
        if let Some(feedback) = feedback {
            user.push_str(&format!(
                "\n\nThe previous query was rejected.\nReason: {}\nPrevious query:\n{}\nReturn a corrected statement.",
                feedback.reason, feedback.previous_sql
            ));
        }
        ChatPrompt::new(synthesizer_system_prompt(), user)
    }

    /// Candidate statement for the context, extracted from the raw response.
    pub async fn synthesize(&self, context: &SqlContext<'_>, feedback: Option<&RetryFeedback>) -> Result<String> {
        let raw = self.generator.generate(&self.prompt(context, feedback)).await?;
        debug!(response = %raw, "synthesizer response");
        Ok(extract_statement(&raw, "sql"))
    }
}
