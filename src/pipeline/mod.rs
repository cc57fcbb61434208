//! Pipeline entry point
//!
//! One run drives every stage in order: route, decompose, select columns,
//! extract filters, resolve values, then synthesize and validate SQL under
//! the retry policy. Run state lives on the stack of [`Pipeline::run`] and is
//! returned whole as a [`RunOutcome`].

pub mod retry;

pub use retry::{SqlAttempt, SqlRetryLoop};

use crate::catalog::KnowledgeCatalog;
use crate::column_selector::{ColumnSelectionRow, ColumnSelector};
use crate::config::PipelineConfig;
use crate::decomposer::{Decomposer, SubquestionAssignment};
use crate::error::{NlqError, Result};
use crate::filters::{columns_with_samples, FilterExtractor, FilterList};
use crate::fuzzy_matcher::FuzzyMatcher;
use crate::llm::TextGenerator;
use crate::parallel::OrderedParallelExecutor;
use crate::resolver::{FuzzyValueResolver, ValueSource};
use crate::router::{default_capability_groups, tables_for, CapabilityGroup, CapabilityRouter};
use crate::sql::{SqlContext, SqlSynthesizer, SqlValidator, ValidationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub millis: u64,
}

/// Everything a run produced, raw and processed, so a reader can tell which
/// stage changed what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub question: String,
    pub capability_groups: Vec<String>,
    pub tables: Vec<String>,
    pub subquestions: Vec<SubquestionAssignment>,
    pub columns_selected: Vec<ColumnSelectionRow>,
    pub filters_raw: FilterList,
    pub filters_matched: FilterList,
    pub sql_candidate: String,
    pub sql: String,
    pub validation: ValidationStatus,
    pub attempts: u8,
    pub stage_timings: Vec<StageTiming>,
}

impl RunOutcome {
    /// The validated SQL, or the rejection as an error.
    pub fn into_validated_sql(self) -> Result<String> {
        match self.validation {
            ValidationStatus::Passed => Ok(self.sql),
            ValidationStatus::Failed { reason } => Err(NlqError::SqlValidation {
                attempts: self.attempts,
                reason,
            }),
        }
    }
}

#[derive(Default)]
struct StageClock {
    timings: Vec<StageTiming>,
}

impl StageClock {
    fn record(&mut self, stage: &str, started: Instant) {
        let millis = started.elapsed().as_millis() as u64;
        info!(stage, millis, "stage finished");
        self.timings.push(StageTiming {
            stage: stage.to_string(),
            millis,
        });
    }
}

pub struct Pipeline {
    catalog: Arc<KnowledgeCatalog>,
    router: CapabilityRouter,
    decomposer: Decomposer,
    selector: ColumnSelector,
    extractor: FilterExtractor,
    resolver: FuzzyValueResolver,
    synthesizer: SqlSynthesizer,
    validator: SqlValidator,
    executor: OrderedParallelExecutor,
    retry: SqlRetryLoop,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<KnowledgeCatalog>,
        values: Arc<dyn ValueSource>,
        config: &PipelineConfig,
    ) -> Self {
        Self::with_groups(generator, catalog, values, config, default_capability_groups())
    }

    pub fn with_groups(
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<KnowledgeCatalog>,
        values: Arc<dyn ValueSource>,
        config: &PipelineConfig,
        groups: Vec<CapabilityGroup>,
    ) -> Self {
        Self {
            router: CapabilityRouter::new(Arc::clone(&generator), groups),
            decomposer: Decomposer::new(Arc::clone(&generator), Arc::clone(&catalog)),
            selector: ColumnSelector::new(Arc::clone(&generator), Arc::clone(&catalog)),
            extractor: FilterExtractor::new(Arc::clone(&generator)),
            resolver: FuzzyValueResolver::new(values, FuzzyMatcher::new(config.scorer))
                .with_min_score(config.min_match_score),
            synthesizer: SqlSynthesizer::new(Arc::clone(&generator)),
            validator: SqlValidator::new(generator),
            executor: OrderedParallelExecutor::new(config.concurrency),
            retry: SqlRetryLoop::new(config.max_retries),
            catalog,
        }
    }

    pub async fn run(&self, question: &str) -> Result<RunOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(NlqError::InvalidInput("question is empty".to_string()));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.run_stages(run_id, question).instrument(span).await
    }

    async fn run_stages(&self, run_id: Uuid, question: &str) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let mut clock = StageClock::default();
        info!(question, "pipeline run started");

        let started = Instant::now();
        let routed = self.router.route(question).await?;
        let mut groups = self.router.resolve_groups(&routed);
        if groups.is_empty() {
            warn!(routed = %routed, "router named no known capability group, using all groups");
            groups = self.router.groups().iter().collect();
        }
        let capability_groups: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
        let tables = tables_for(&groups);
        info!(groups = ?capability_groups, tables = ?tables, "routed question");
        clock.record("router", started);

        let started = Instant::now();
        let subquestions = self.decomposer.decompose(question, &tables).await?;
        clock.record("decomposer", started);

        let started = Instant::now();
        let columns_selected = self
            .selector
            .select_all(question, &subquestions, &self.executor)
            .await?;
        clock.record("column_selector", started);

        let started = Instant::now();
        let samples = columns_with_samples(&self.catalog, &columns_selected);
        let filters_raw = self.extractor.extract_filters(question, &samples).await?;
        clock.record("filter_extractor", started);

        let started = Instant::now();
        let filters_matched = self.resolver.resolve(&filters_raw, &self.executor).await?;
        clock.record("value_resolver", started);

        let started = Instant::now();
        let context = SqlContext::new(question, &columns_selected, &filters_matched);
        let attempt = self.retry.run(&self.synthesizer, &self.validator, &context).await?;
        clock.record("sql", started);

        info!(
            attempts = attempt.attempts,
            passed = attempt.validation.is_passed(),
            "pipeline run finished"
        );

        Ok(RunOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            question: question.to_string(),
            capability_groups,
            tables,
            subquestions,
            columns_selected,
            filters_raw,
            filters_matched,
            sql_candidate: attempt.sql_candidate,
            sql: attempt.sql,
            validation: attempt.validation,
            attempts: attempt.attempts,
            stage_timings: clock.timings,
        })
    }
}
