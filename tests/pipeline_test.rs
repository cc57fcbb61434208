use async_trait::async_trait;
use nlq_engine::catalog::KnowledgeCatalog;
use nlq_engine::config::PipelineConfig;
use nlq_engine::filters::{FilterList, FilterPredicate, PredicateClass};
use nlq_engine::llm::{ChatPrompt, TextGenerator};
use nlq_engine::prompts::{
    column_selector_system_prompt, synthesizer_system_prompt, validator_system_prompt, DECOMPOSER_SYSTEM_PROMPT,
    FILTER_SYSTEM_PROMPT, ROUTER_SYSTEM_PROMPT,
};
use nlq_engine::resolver::{EmptyValueSource, StaticValueSource, ValueSource};
use nlq_engine::sql::ValidationStatus;
use nlq_engine::{NlqError, Pipeline, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Router,
    Decomposer,
    ColumnSelector,
    Filters,
    Synthesizer,
    Validator,
}

/// Answers each stage from a fixed script. Column selection is answered by
/// the first needle found in the column list, since those calls run
/// concurrently. The validator echoes the candidate back.
struct ScriptedGenerator {
    router: String,
    decomposer: String,
    columns: Vec<(&'static str, &'static str)>,
    filters: String,
    sql: String,
    prompts: Mutex<Vec<(Stage, ChatPrompt)>>,
}

impl ScriptedGenerator {
    fn new(router: &str, decomposer: &str, filters: &str, sql: &str) -> Self {
        Self {
            router: router.to_string(),
            decomposer: decomposer.to_string(),
            columns: Vec::new(),
            filters: filters.to_string(),
            sql: sql.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn columns_when(mut self, needle: &'static str, reply: &'static str) -> Self {
        self.columns.push((needle, reply));
        self
    }

    fn stage_of(prompt: &ChatPrompt) -> Stage {
        if prompt.system == ROUTER_SYSTEM_PROMPT {
            Stage::Router
        } else if prompt.system == DECOMPOSER_SYSTEM_PROMPT {
            Stage::Decomposer
        } else if prompt.system == column_selector_system_prompt() {
            Stage::ColumnSelector
        } else if prompt.system == FILTER_SYSTEM_PROMPT {
            Stage::Filters
        } else if prompt.system == synthesizer_system_prompt() {
            Stage::Synthesizer
        } else if prompt.system == validator_system_prompt() {
            Stage::Validator
        } else {
            panic!("prompt from an unknown stage: {}", prompt.system)
        }
    }

    fn prompts_for(&self, stage: Stage) -> Vec<ChatPrompt> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
        let stage = Self::stage_of(prompt);
        self.prompts.lock().unwrap().push((stage, prompt.clone()));
        let reply = match stage {
            Stage::Router => self.router.clone(),
            Stage::Decomposer => self.decomposer.clone(),
            Stage::ColumnSelector => self
                .columns
                .iter()
                .find(|(needle, _)| prompt.user.contains(needle))
                .map(|(_, reply)| reply.to_string())
                .unwrap_or_else(|| "[]".to_string()),
            Stage::Filters => self.filters.clone(),
            Stage::Synthesizer => self.sql.clone(),
            Stage::Validator => prompt
                .user
                .split_once("SQL to validate:\n")
                .map(|(_, sql)| sql.to_string())
                .unwrap_or_default(),
        };
        Ok(reply)
    }
}

fn catalog() -> Arc<KnowledgeCatalog> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("metadata/knowledgebase.json");
    Arc::new(KnowledgeCatalog::load(&path).unwrap())
}

fn pipeline(generator: Arc<ScriptedGenerator>, values: Arc<dyn ValueSource>) -> Pipeline {
    Pipeline::new(generator, catalog(), values, &PipelineConfig::default())
}

#[tokio::test]
async fn test_city_with_most_customers() {
    let sql = "SELECT customer.customer_city, COUNT(DISTINCT customer.customer_id) AS customer_count\nFROM customer\nGROUP BY customer.customer_city\nORDER BY customer_count DESC\nLIMIT 1";
    let generator = Arc::new(
        ScriptedGenerator::new(
            "['customer']",
            "[['number of customers in each city', 'customer']]",
            r#"["no"]"#,
            &format!("```sql\n{}\n```", sql),
        )
        .columns_when(
            "customer_city",
            r#"[["customer_id", "count customers"], ["customer_unique_id", "dedup"], ["customer_city", "group by city"]]"#,
        ),
    );

    let outcome = pipeline(generator.clone(), Arc::new(EmptyValueSource))
        .run("Which city has the most customers?")
        .await
        .unwrap();

    assert_eq!(outcome.capability_groups, vec!["customer"]);
    assert_eq!(outcome.tables, vec!["customer", "sellers"]);
    assert_eq!(outcome.subquestions.len(), 1);
    assert_eq!(outcome.subquestions[0].table, "customer");

    let columns: Vec<&str> = outcome.columns_selected.iter().map(|r| r.column.as_str()).collect();
    assert_eq!(columns, vec!["customer_id", "customer_city"]);

    assert_eq!(outcome.filters_raw, FilterList::NoFilters);
    assert_eq!(outcome.filters_matched, FilterList::NoFilters);
    assert!(outcome.sql.contains("GROUP BY customer.customer_city"));
    assert!(outcome.sql.contains("ORDER BY customer_count DESC"));
    assert_eq!(outcome.validation, ValidationStatus::Passed);
    assert_eq!(outcome.attempts, 1);

    // The filter extractor sees catalog samples for the selected columns
    let filter_prompts = generator.prompts_for(Stage::Filters);
    assert!(filter_prompts[0].user.contains("rio de janeiro"));
}

#[tokio::test]
async fn test_monthly_sales_keeps_date_range_unresolved() {
    let sql = "SELECT DATE_FORMAT(orders.order_purchase_timestamp, '%Y-%m') AS sales_month, SUM(order_payments.payment_value) AS total_sales\nFROM orders\nJOIN order_payments ON orders.order_id = order_payments.order_id\nWHERE orders.order_purchase_timestamp BETWEEN '2017-01-01' AND '2017-12-31'\nGROUP BY sales_month\nORDER BY sales_month";
    let generator = Arc::new(
        ScriptedGenerator::new(
            "['orders']",
            r#"[["total sales per month", "order_payments"], ["purchase month in 2017", "orders"]]"#,
            r#"["yes", [["orders", "order_purchase_timestamp", "between 2017-01-01 and 2017-12-31"]]]"#,
            sql,
        )
        .columns_when("payment_value", r#"[["order_id", "join to orders"], ["payment_value", "sum for sales"]]"#)
        .columns_when(
            "order_purchase_timestamp",
            r#"[["order_id", "join to payments"], ["order_purchase_timestamp", "monthly bucket"]]"#,
        ),
    );

    let outcome = pipeline(generator.clone(), Arc::new(StaticValueSource::new()))
        .run("What is the monthly trend of total sales in 2017?")
        .await
        .unwrap();

    let rows: Vec<(&str, &str)> = outcome
        .columns_selected
        .iter()
        .map(|r| (r.table.as_str(), r.column.as_str()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("order_payments", "order_id"),
            ("order_payments", "payment_value"),
            ("orders", "order_id"),
            ("orders", "order_purchase_timestamp"),
        ]
    );

    let expected = FilterList::Filters(vec![FilterPredicate {
        table: "orders".into(),
        column: "order_purchase_timestamp".into(),
        predicate: "between 2017-01-01 and 2017-12-31".into(),
    }]);
    assert_eq!(outcome.filters_raw, expected);
    assert_eq!(outcome.filters_matched, expected);
    assert_eq!(outcome.filters_matched.predicates()[0].class(), PredicateClass::Range);

    assert!(outcome.sql.contains("DATE_FORMAT(orders.order_purchase_timestamp, '%Y-%m')"));
    assert!(outcome.sql.contains("SUM(order_payments.payment_value)"));
    assert!(outcome.sql.contains("orders.order_id = order_payments.order_id"));
    assert!(outcome.validation.is_passed());

    let synth = generator.prompts_for(Stage::Synthesizer);
    assert!(synth[0].user.contains("name of table:order_payments"));
}

#[tokio::test]
async fn test_categorical_filter_resolves_to_stored_spelling() {
    let sql = "SELECT COUNT(DISTINCT orders.order_id) AS delivered_orders\nFROM orders\nJOIN customer ON orders.customer_id = customer.customer_id\nWHERE customer.customer_city = 'São Paulo' AND orders.order_status = 'delivered'";
    let generator = Arc::new(
        ScriptedGenerator::new(
            "['customer', 'orders']",
            r#"[["delivered orders", "orders"], ["orders from sao paulo", "customer"]]"#,
            r#"["yes", ["customer", "customer_city", "sao paulo"], ["orders", "order_status", "Delivered"]]"#,
            sql,
        )
        .columns_when(
            "order_status",
            r#"[["order_id", "count"], ["order_status", "delivered filter"], ["customer_id", "join"]]"#,
        )
        .columns_when("customer_city", r#"[["customer_id", "join"], ["customer_city", "city filter"]]"#),
    );
    let values = StaticValueSource::new()
        .with_values("customer", "customer_city", &["sao bernardo do campo", "São Paulo", "santo andre"])
        .with_values("orders", "order_status", &["delivered", "shipped", "canceled"]);

    let outcome = pipeline(generator.clone(), Arc::new(values))
        .run("How many orders from sao paulo were delivered?")
        .await
        .unwrap();

    let raw: Vec<&str> = outcome.filters_raw.predicates().iter().map(|p| p.predicate.as_str()).collect();
    let matched: Vec<&str> = outcome
        .filters_matched
        .predicates()
        .iter()
        .map(|p| p.predicate.as_str())
        .collect();
    assert_eq!(raw, vec!["sao paulo", "Delivered"]);
    assert_eq!(matched, vec!["São Paulo", "delivered"]);

    let synth = generator.prompts_for(Stage::Synthesizer);
    assert!(synth[0].user.contains(r#"["customer","customer_city","São Paulo"]"#));
}

#[tokio::test]
async fn test_validator_returns_compliant_sql_unchanged() {
    let sql = "SELECT order_items.seller_id, COUNT(DISTINCT order_items.order_id) AS order_count\nFROM order_items\nGROUP BY order_items.seller_id\nORDER BY order_count DESC";
    let generator = Arc::new(
        ScriptedGenerator::new(
            "['orders']",
            r#"[["orders per seller", "order_items"]]"#,
            r#"["no"]"#,
            sql,
        )
        .columns_when("seller_id", r#"[["order_id", "count"], ["seller_id", "group"]]"#),
    );

    let outcome = pipeline(generator, Arc::new(EmptyValueSource))
        .run("Which seller received the most orders?")
        .await
        .unwrap();

    assert_eq!(outcome.sql_candidate.as_bytes(), sql.as_bytes());
    assert_eq!(outcome.sql.as_bytes(), sql.as_bytes());
}

#[tokio::test]
async fn test_unknown_router_output_falls_back_to_all_groups() {
    let generator = Arc::new(ScriptedGenerator::new(
        "I think the billing agent",
        "[]",
        r#"["no"]"#,
        "SELECT 1",
    ));

    let outcome = pipeline(generator, Arc::new(EmptyValueSource))
        .run("Show me everything")
        .await
        .unwrap();

    assert_eq!(outcome.capability_groups, vec!["customer", "orders", "product"]);
    assert_eq!(outcome.tables.len(), 8);
    assert!(outcome.columns_selected.is_empty());
}

#[tokio::test]
async fn test_decomposer_naming_unknown_table_is_hard_failure() {
    let generator = Arc::new(ScriptedGenerator::new(
        "['orders']",
        r#"[["refunds per order", "refunds"]]"#,
        r#"["no"]"#,
        "SELECT 1",
    ));

    let err = pipeline(generator, Arc::new(EmptyValueSource))
        .run("How many refunds were issued?")
        .await
        .unwrap_err();
    assert!(matches!(err, NlqError::MissingCatalogEntry { ref table } if table == "refunds"));
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let generator = Arc::new(ScriptedGenerator::new("[]", "[]", r#"["no"]"#, "SELECT 1"));
    let err = pipeline(generator.clone(), Arc::new(EmptyValueSource))
        .run("   ")
        .await
        .unwrap_err();
    assert!(matches!(err, NlqError::InvalidInput(_)));
    assert!(generator.prompts_for(Stage::Router).is_empty());
}

#[tokio::test]
async fn test_unparseable_sql_reports_failed_status_after_retries() {
    let generator = Arc::new(ScriptedGenerator::new(
        "['orders']",
        r#"[["order count", "orders"]]"#,
        r#"["no"]"#,
        "SELECT COUNT(DISTINCT orders.order_id FROM orders",
    ));
    let config = PipelineConfig {
        max_retries: 2,
        ..PipelineConfig::default()
    };

    let outcome = Pipeline::new(generator.clone(), catalog(), Arc::new(EmptyValueSource), &config)
        .run("How many orders are there?")
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 3);
    assert!(!outcome.validation.is_passed());
    assert_eq!(generator.prompts_for(Stage::Synthesizer).len(), 3);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["validation"]["status"], "failed");
    assert!(matches!(outcome.into_validated_sql(), Err(NlqError::SqlValidation { attempts: 3, .. })));
}
