use anyhow::Result;
use clap::{Parser, Subcommand};
use nlq_engine::catalog::KnowledgeCatalog;
use nlq_engine::config::PipelineConfig;
use nlq_engine::db::{init_pool, SqlValueSource};
use nlq_engine::llm::LlmClient;
use nlq_engine::resolver::{EmptyValueSource, ValueSource};
use nlq_engine::Pipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nlq-engine")]
#[command(about = "Natural-language questions to validated MySQL over the Olist dataset")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn a question into a validated SQL statement
    Ask {
        /// The question in natural language
        question: String,

        /// Path to the knowledge catalog (or set KNOWLEDGEBASE_PATH)
        #[arg(short, long)]
        knowledgebase: Option<PathBuf>,

        /// Extra synthesis + validation attempts (0-6)
        #[arg(long)]
        max_retries: Option<u8>,

        /// Concurrent column-selection and value-lookup tasks (1-64)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print the whole run outcome as JSON instead of just the SQL
        #[arg(long)]
        json: bool,
    },
    /// List the tables and columns in the knowledge catalog
    Catalog {
        #[arg(short, long)]
        knowledgebase: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = PipelineConfig::from_env()?;

    match args.command {
        Commands::Ask {
            question,
            knowledgebase,
            max_retries,
            concurrency,
            json,
        } => {
            if let Some(path) = knowledgebase {
                config.knowledgebase_path = path;
            }
            if let Some(n) = max_retries {
                config.max_retries = n;
            }
            if let Some(n) = concurrency {
                config.concurrency = n;
            }
            config.validate()?;
            ask(&question, &config, json).await
        }
        Commands::Catalog { knowledgebase } => {
            if let Some(path) = knowledgebase {
                config.knowledgebase_path = path;
            }
            list_catalog(&config)
        }
    }
}

async fn ask(question: &str, config: &PipelineConfig, json: bool) -> Result<()> {
    let (catalog, _) = KnowledgeCatalog::load_with_fallbacks(&config.knowledgebase_path)?;

    let llm = LlmClient::from_config(&config.llm)?;
    info!(model = llm.model(), "text-generation client ready");

    let values: Arc<dyn ValueSource> = match &config.database_url {
        Some(url) => {
            let pool = init_pool(url, u32::try_from(config.concurrency).unwrap_or(u32::MAX)).await?;
            Arc::new(SqlValueSource::new(pool))
        }
        None => {
            warn!("no DATABASE_URL set, categorical filters keep their extracted values");
            Arc::new(EmptyValueSource)
        }
    };

    let pipeline = Pipeline::new(Arc::new(llm), Arc::new(catalog), values, config);
    let outcome = pipeline.run(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        if let Some(reason) = outcome.validation.reason() {
            anyhow::bail!("SQL failed validation after {} attempt(s): {}", outcome.attempts, reason);
        }
        return Ok(());
    }

    let sql = outcome.into_validated_sql()?;
    println!("{}", sql);
    Ok(())
}

fn list_catalog(config: &PipelineConfig) -> Result<()> {
    let (catalog, path) = KnowledgeCatalog::load_with_fallbacks(&config.knowledgebase_path)?;
    println!("Knowledge catalog: {}", path.display());
    for table in catalog.table_names() {
        let entry = catalog.entry(table)?;
        println!("\n{} - {}", entry.table, entry.description);
        for column in &entry.columns {
            println!("  {:<32} {}", column.name, column.description);
        }
    }
    Ok(())
}
