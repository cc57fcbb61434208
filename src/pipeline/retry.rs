//! Bounded retry around the synthesis + validation pair.

use crate::error::{NlqError, Result};
use crate::sql::{check_well_formed, RetryFeedback, SqlContext, SqlSynthesizer, SqlValidator, ValidationStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Final state of the synthesis + validation pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlAttempt {
    pub sql_candidate: String,
    pub sql: String,
    pub validation: ValidationStatus,
    pub attempts: u8,
}

/// Only generation-service failures are worth another attempt; anything else
/// fails the same way again.
pub fn is_retryable(err: &NlqError) -> bool {
    matches!(err, NlqError::Llm(_))
}

pub struct SqlRetryLoop {
    max_retries: u8,
}

impl SqlRetryLoop {
    pub fn new(max_retries: u8) -> Self {
        Self { max_retries }
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_retries.saturating_add(1)
    }

    /// Synthesize, validate and gate until a statement passes or attempts run out.
    ///
    /// A statement that still fails the gate on the last attempt is returned
    /// with a failed status. A generation error on the last attempt is returned
    /// as the error.
    pub async fn run(
        &self,
        synthesizer: &SqlSynthesizer,
        validator: &SqlValidator,
        context: &SqlContext<'_>,
    ) -> Result<SqlAttempt> {
        let max_attempts = self.max_attempts();
        let mut feedback: Option<RetryFeedback> = None;

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "SQL attempt");
            let last = attempt == max_attempts;

            let generated = match synthesizer.synthesize(context, feedback.as_ref()).await {
                Ok(candidate) => validator
                    .validate(context, &candidate)
                    .await
                    .map(|sql| (candidate, sql)),
                Err(e) => Err(e),
            };

            let (candidate, sql) = match generated {
                Ok(pair) => pair,
                Err(e) if is_retryable(&e) && !last => {
                    warn!(attempt, error = %e, "SQL generation failed, retrying");
                    feedback = None;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let validation = check_well_formed(&sql);
            match validation.reason() {
                None => {
                    info!(attempt, "SQL passed validation");
                    return Ok(SqlAttempt {
                        sql_candidate: candidate,
                        sql,
                        validation,
                        attempts: attempt,
                    });
                }
                Some(reason) if !last => {
                    warn!(attempt, reason, "validated SQL rejected, retrying");
                    feedback = Some(RetryFeedback {
                        previous_sql: sql.clone(),
                        reason: reason.to_string(),
                    });
                }
                Some(reason) => {
                    warn!(attempt, reason, "validated SQL rejected, no attempts left");
                    return Ok(SqlAttempt {
                        sql_candidate: candidate,
                        sql,
                        validation,
                        attempts: attempt,
                    });
                }
            }
        }

        // max_attempts is at least 1, so the loop always returns
        Err(NlqError::SqlValidation {
            attempts: max_attempts,
            reason: "no attempt was made".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterList;
    use crate::llm::{ChatPrompt, TextGenerator};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Pops scripted replies in call order.
    struct Script {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<ChatPrompt>>,
    }

    impl Script {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Script {
        async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(NlqError::Llm("script exhausted".into())))
        }
    }

    fn ok(s: &str) -> Result<String> {
        Ok(s.to_string())
    }

    async fn run_with(script: Arc<Script>, max_retries: u8) -> Result<SqlAttempt> {
        let synthesizer = SqlSynthesizer::new(script.clone());
        let validator = SqlValidator::new(script);
        let context = SqlContext::new("q", &[], &FilterList::NoFilters);
        SqlRetryLoop::new(max_retries).run(&synthesizer, &validator, &context).await
    }

    #[tokio::test]
    async fn test_passes_first_time() {
        let script = Script::new(vec![ok("SELECT 1"), ok("SELECT 1")]);
        let attempt = run_with(script, 3).await.unwrap();
        assert_eq!(attempt.attempts, 1);
        assert!(attempt.validation.is_passed());
    }

    #[tokio::test]
    async fn test_rejection_reason_feeds_next_synthesis() {
        let script = Script::new(vec![
            ok("SELECT COUNT(order_id FROM orders"),
            ok("SELECT COUNT(order_id FROM orders"),
            ok("SELECT COUNT(order_id) FROM orders"),
            ok("SELECT COUNT(order_id) FROM orders"),
        ]);
        let attempt = run_with(script.clone(), 2).await.unwrap();
        assert_eq!(attempt.attempts, 2);
        assert_eq!(attempt.sql, "SELECT COUNT(order_id) FROM orders");

        let prompts = script.prompts.lock().unwrap();
        assert!(prompts[2].user.contains("The previous query was rejected"));
        assert!(prompts[2].user.contains("SELECT COUNT(order_id FROM orders"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_failed_status() {
        let script = Script::new(vec![ok("SELECT (1"), ok("SELECT (1")]);
        let attempt = run_with(script, 0).await.unwrap();
        assert_eq!(attempt.attempts, 1);
        assert!(!attempt.validation.is_passed());
    }

    #[tokio::test]
    async fn test_service_error_is_retried_then_surfaced() {
        let script = Script::new(vec![
            Err(NlqError::Llm("timeout".into())),
            ok("SELECT 1"),
            ok("SELECT 1"),
        ]);
        assert_eq!(run_with(script, 1).await.unwrap().attempts, 2);

        let script = Script::new(vec![Err(NlqError::Llm("unauthorized".into()))]);
        assert!(matches!(run_with(script, 0).await, Err(NlqError::Llm(_))));
    }
}
