//! # docqa CLI
//!
//! Command-line interface for the documentation Q&A service.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite index and run schema migrations |
//! | `docqa ingest` | Index new and changed documents under the docs root |
//! | `docqa query "<text>"` | Retrieve ranked chunks without answer generation |
//! | `docqa ask "<text>"` | Full retrieval-augmented answer via the chat model |
//! | `docqa stats` | Show index counters |
//! | `docqa clear` | Drop every indexed document |
//!
//! ## Examples
//!
//! ```bash
//! docqa init --config ./config/docqa.toml
//! docqa ingest --config ./config/docqa.toml
//! docqa ingest --force                   # re-index everything
//! docqa ingest --file docs/guide/hmr.md  # single document
//! docqa query "how do I set up a proxy?" --top-k 3
//! docqa ask "how do I set up a proxy?"
//! docqa ask "继续" --conversation 6f9c…
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::answer::{AnswerPipeline, AnswerRequest};
use docqa::config::{self, Config};
use docqa::conversation::ConversationStore;
use docqa::embedding::create_embedder;
use docqa::ingest::{FileOutcome, IngestionPipeline};
use docqa::llm::OpenAiChatModel;
use docqa::retrieval::Retriever;
use docqa::store::{ChunkStore, SqliteStore};

/// Documentation Q&A service: incremental ingestion, intent-aware
/// retrieval, and grounded answer generation over a markdown corpus.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Retrieval-augmented Q&A over a local documentation corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the SQLite file and all required tables. Idempotent.
    Init,

    /// Ingest documents from the configured docs root.
    ///
    /// Discovers markdown files, skips documents whose fingerprint is
    /// unchanged, and chunk-embeds the rest. Failures in individual
    /// files are reported at the end without aborting the run.
    Ingest {
        /// Re-index every document, ignoring stored fingerprints.
        #[arg(long)]
        force: bool,

        /// Ingest a single file instead of the whole corpus.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Retrieve ranked chunks for a query (no answer generation).
    Query {
        /// The question or search text.
        query: String,

        /// Maximum results to return (capped by `retrieval.top_k`).
        #[arg(long, default_value_t = 3)]
        top_k: usize,
    },

    /// Answer a question with retrieved context and the chat model.
    Ask {
        /// The question.
        question: String,

        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,

        /// Omit source references from the output.
        #[arg(long)]
        no_sources: bool,
    },

    /// Show index counters.
    Stats,

    /// Remove every document, chunk, and vector from the index.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            SqliteStore::connect(&cfg.db.path).await?;
            println!("Index initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { force, file } => run_ingest(&cfg, force, file).await?,
        Commands::Query { query, top_k } => run_query(&cfg, &query, top_k).await?,
        Commands::Ask {
            question,
            conversation,
            no_sources,
        } => run_ask(&cfg, question, conversation, no_sources).await?,
        Commands::Stats => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            let stats = store.stats().await?;
            println!("documents: {}", stats.documents);
            println!("chunks:    {}", stats.chunks);
            println!("vectors:   {}", stats.vectors);
        }
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear the index without --yes");
            }
            let store = SqliteStore::connect(&cfg.db.path).await?;
            store.clear().await?;
            println!("Index cleared.");
        }
    }

    Ok(())
}

async fn run_ingest(cfg: &Config, force: bool, file: Option<PathBuf>) -> anyhow::Result<()> {
    let store: Arc<dyn ChunkStore> = Arc::new(SqliteStore::connect(&cfg.db.path).await?);
    let embedder = Arc::from(create_embedder(&cfg.embedding)?);
    let pipeline = IngestionPipeline::new(store, embedder, cfg);

    if let Some(path) = file {
        let outcome = pipeline.ingest_file(&path, force).await?;
        match outcome {
            FileOutcome::Unchanged => println!("{}: unchanged", path.display()),
            FileOutcome::Unpublished => println!("{}: unpublished, removed", path.display()),
            FileOutcome::Indexed { chunks, .. } => {
                println!("{}: indexed ({} chunks)", path.display(), chunks)
            }
        }
        return Ok(());
    }

    let result = pipeline.ingest_all(force).await?;
    println!("ingestion complete in {:.1}s", result.elapsed_secs);
    println!("  documents found:     {}", result.documents_found);
    println!("  documents processed: {}", result.documents_processed);
    println!("  documents skipped:   {}", result.documents_skipped);
    println!("  chunks created:      {}", result.chunks_created);
    println!("  vectors stored:      {}", result.vectors_stored);
    println!("  success rate:        {:.1}%", result.success_rate());
    if !result.errors.is_empty() {
        println!("  errors:");
        for error in &result.errors {
            println!("    {}", error);
        }
    }
    Ok(())
}

async fn run_query(cfg: &Config, query: &str, top_k: usize) -> anyhow::Result<()> {
    let store: Arc<dyn ChunkStore> = Arc::new(SqliteStore::connect(&cfg.db.path).await?);
    let embedder = Arc::from(create_embedder(&cfg.embedding)?);
    let retriever = Retriever::new(store, embedder, cfg.retrieval.clone());

    let intent = retriever.classify(query);
    let results = retriever.retrieve(query, top_k).await;

    println!("intent: {}", intent);
    if results.is_empty() {
        println!("no relevant chunks found");
        return Ok(());
    }

    for (i, (chunk, score)) in results.iter().enumerate() {
        println!();
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            score,
            chunk.title,
            chunk.relative_path(&cfg.docs.root)
        );
        if let Some(heading) = &chunk.heading {
            println!("   section: {}", heading);
        }
        let preview: String = chunk.content.chars().take(160).collect();
        println!("   {}", preview.replace('\n', " "));
    }
    Ok(())
}

async fn run_ask(
    cfg: &Config,
    question: String,
    conversation: Option<String>,
    no_sources: bool,
) -> anyhow::Result<()> {
    let store: Arc<dyn ChunkStore> = Arc::new(SqliteStore::connect(&cfg.db.path).await?);
    let embedder = Arc::from(create_embedder(&cfg.embedding)?);
    let retriever = Retriever::new(store, embedder, cfg.retrieval.clone());
    let chat = Arc::new(OpenAiChatModel::new(&cfg.llm)?);
    let conversations = Arc::new(ConversationStore::connect(&cfg.conversations.path).await?);

    let pipeline = AnswerPipeline::new(
        retriever,
        chat,
        Some(conversations),
        cfg.docs.root.clone(),
    );

    let request = AnswerRequest {
        question,
        conversation_id: conversation,
        history: Vec::new(),
        top_k: cfg.retrieval.top_k,
        include_sources: !no_sources,
    };

    let response = pipeline.answer(&request).await;

    println!("{}", response.answer);
    println!();
    println!(
        "confidence: {:.2}  intent: {}  time: {}ms",
        response.confidence_score, response.intent, response.response_time_ms
    );
    if let Some(id) = &response.conversation_id {
        println!("conversation: {}", id);
    }
    if !response.sources.is_empty() {
        println!("sources:");
        for source in &response.sources {
            println!(
                "  [{:.3}] {} ({}#{})",
                source.similarity_score, source.title, source.file_path, source.chunk_index
            );
        }
    }
    Ok(())
}
