use anyhow::{anyhow, Context, Result};
use astro_query::config::{AppConfig, EmbeddingProvider};
use astro_query::execution_loop::{Cancellable, CancellationToken, CorrectionAgent, RunResult};
use astro_query::llm::OpenAiGenerator;
use astro_query::schema_rag::{Embedder, HashEmbedder, OpenAiEmbedder, SchemaIndex, SchemaRetriever};
use astro_query::verifier::LlmJudge;
use astro_query::{Catalog, PromptBuilder, SkyServerExecutor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "astro-query")]
#[command(about = "Natural-language questions to verified SDSS SkyServer SQL")]
struct Args {
    /// Schema catalog JSON (overrides ASTRO_CATALOG_PATH)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Precomputed schema index (overrides ASTRO_INDEX_PATH)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question: generate, execute, verify and explain SQL
    Ask {
        question: String,

        /// Schema elements retrieved as context
        #[arg(long)]
        top_k: Option<usize>,

        /// Maximum attempts for this question
        #[arg(long)]
        max_retries: Option<u32>,

        /// Rows requested with TOP n
        #[arg(long)]
        top_n: Option<u32>,

        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the schema context retrieved for a question
    Retrieve {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Embed the catalog and write the schema index
    Index {
        /// Output path (defaults to the configured index path)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(catalog) = args.catalog {
        config.catalog_path = catalog;
    }
    if let Some(index) = args.index {
        config.index_path = index;
    }

    match args.command {
        Command::Ask {
            question,
            top_k,
            max_retries,
            top_n,
            json,
        } => {
            if let Some(top_n) = top_n {
                config.agent.top_n_results = top_n;
            }
            let top_k = top_k.unwrap_or(config.agent.top_k);
            let max_retries = max_retries.unwrap_or(config.agent.max_retries);
            ask(&config, &question, top_k, max_retries, json).await
        }
        Command::Retrieve { question, top_k } => {
            let top_k = top_k.unwrap_or(config.agent.top_k);
            retrieve(&config, &question, top_k).await
        }
        Command::Index { out } => {
            let out = out.unwrap_or_else(|| config.index_path.clone());
            build_index(&config, out).await
        }
    }
}

fn embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding_provider {
        EmbeddingProvider::Hash => Ok(Arc::new(HashEmbedder::new(config.embedding_dim))),
        EmbeddingProvider::OpenAi => {
            let api_key = api_key(config)?;
            Ok(Arc::new(OpenAiEmbedder::new(
                api_key,
                config.base_url.clone(),
                config.embedding_model.clone(),
                config.embedding_dim,
                config.agent.timeouts.embedding(),
            )?))
        }
    }
}

fn api_key(config: &AppConfig) -> Result<String> {
    config
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))
}

/// Load the index if present, otherwise embed the catalog in memory.
async fn load_index(config: &AppConfig, embedder: &dyn Embedder) -> Result<SchemaIndex> {
    if config.index_path.exists() {
        return Ok(SchemaIndex::load(&config.index_path)?);
    }
    warn!(
        index = %config.index_path.display(),
        "Schema index not found, embedding catalog in memory"
    );
    let catalog = Catalog::load(&config.catalog_path)
        .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;
    Ok(SchemaIndex::build(&catalog, embedder).await?)
}

async fn retriever(config: &AppConfig) -> Result<Arc<SchemaRetriever>> {
    let embedder = embedder(config)?;
    let index = load_index(config, embedder.as_ref()).await?;
    Ok(Arc::new(SchemaRetriever::new(Arc::new(index), embedder)?))
}

async fn ask(config: &AppConfig, question: &str, top_k: usize, max_retries: u32, json: bool) -> Result<()> {
    let retriever = retriever(config).await?;
    let generator = Arc::new(OpenAiGenerator::new(
        api_key(config)?,
        config.base_url.clone(),
        config.chat_model.clone(),
        config.agent.timeouts.generation(),
    )?);
    let executor = Arc::new(SkyServerExecutor::new(
        config.skyserver_url.clone(),
        config.agent.timeouts.execution(),
    )?);
    let judge = Arc::new(LlmJudge::new(
        generator.clone(),
        PromptBuilder::new(config.agent.top_n_results),
    ));
    let agent = CorrectionAgent::new(retriever, generator, executor, judge, config.agent.clone())?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let run = agent.run(question, top_k, max_retries, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run(&run, config.agent.top_n_results as usize);
    }

    if let Some(err) = run.error() {
        error!("{}", err);
        std::process::exit(1);
    }
    Ok(())
}

fn print_run(run: &RunResult, preview_rows: usize) {
    println!("\n=== Attempt Log ===");
    for attempt in run.log().entries() {
        let status = match &attempt.failure {
            None => "ok".to_string(),
            Some(failure) => format!("{} ({})", failure.kind, failure.reason),
        };
        println!("#{} {}", attempt.index, status);
        if let Some(sql) = &attempt.sql {
            println!("    {}", sql.replace('\n', "\n    "));
        }
    }

    match run {
        RunResult::Succeeded {
            sql,
            result,
            explanation,
            ..
        } => {
            println!("\n=== SQL ===\n{}", sql);
            println!("\n=== Result ({} rows) ===\n{}", result.row_count(), result.preview(preview_rows));
            println!("\n=== Explanation ===\n{}", explanation);
        }
        RunResult::Exhausted {
            reason,
            last_sql,
            last_error,
            ..
        } => {
            println!("\n=== Failed: {} ===", reason);
            if let Some(sql) = last_sql {
                println!("Last SQL:\n{}", sql);
            }
            if let Some(err) = last_error {
                println!("Last error: {}", err);
            }
        }
    }
}

async fn retrieve(config: &AppConfig, question: &str, top_k: usize) -> Result<()> {
    let retriever = retriever(config).await?;
    let context = match config.agent.min_score {
        Some(min_score) => retriever.retrieve_with_threshold(question, top_k, min_score).await?,
        None => retriever.retrieve(question, top_k).await?,
    };

    println!("\n=== Retrieved Schema Context ===");
    for (rank, entry) in context.summary().iter().enumerate() {
        println!("{}. {} (score {:.3})", rank + 1, entry.name, entry.score);
        if !entry.description.is_empty() {
            println!("   {}", entry.description);
        }
    }
    Ok(())
}

async fn build_index(config: &AppConfig, out: PathBuf) -> Result<()> {
    let catalog = Catalog::load(&config.catalog_path)
        .with_context(|| format!("loading catalog {}", config.catalog_path.display()))?;
    let embedder = embedder(config)?;
    let index = SchemaIndex::build(&catalog, embedder.as_ref()).await?;
    index.save(&out)?;
    info!(path = %out.display(), elements = index.len(), "Schema index written");
    Ok(())
}
