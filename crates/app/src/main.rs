use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_chat_core::{
    ingest_file, ingest_folder, ChatConfig, ChatCoordinator, ChatError, ChatOptions,
    ChunkingConfig, DocumentIndex, Embedder, IngestionReport, OllamaChatModel, OllamaClient,
    OllamaEmbedder, OpenSearchStore, SearchConfig, SessionContext,
};
use futures_util::StreamExt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL
    #[arg(long, env = "OPENSEARCH_URL", default_value = "http://localhost:9200")]
    opensearch_url: String,

    /// Index that stores document chunks
    #[arg(long, env = "DOC_INDEX", default_value = "documents")]
    index: String,

    /// Server-side pipeline that fuses lexical and vector scores
    #[arg(long, env = "SEARCH_PIPELINE", default_value = "nlp-search-pipeline")]
    search_pipeline: String,

    /// Model runtime base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Chat model served by the runtime
    #[arg(long, env = "CHAT_MODEL", default_value = "llama3.2:1b")]
    chat_model: String,

    /// Embedding model served by the runtime
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    embedding_model: String,

    /// Embedding dimension; must match the index mapping
    #[arg(long, env = "EMBEDDING_DIMENSION", default_value = "768")]
    embedding_dimension: usize,

    /// Prefix inputs with a passage marker for asymmetric embedding models
    #[arg(long, env = "ASYMMETRIC_EMBEDDING", default_value_t = false)]
    asymmetric_embedding: bool,

    /// Tokens per chunk
    #[arg(long, env = "CHUNK_SIZE", default_value = "300")]
    chunk_size: usize,

    /// Tokens shared between consecutive chunks
    #[arg(long, env = "CHUNK_OVERLAP", default_value = "100")]
    chunk_overlap: usize,

    /// Append logs to this file instead of stderr
    #[arg(long, env = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF file, or every PDF under a folder, into the index.
    Ingest {
        /// PDF file or folder to ingest recursively.
        path: PathBuf,
    },
    /// List the documents currently present in the index.
    List,
    /// Delete a document and all of its chunks from the index.
    Delete {
        /// Document name as shown by `list`.
        name: String,
    },
    /// Run a one-off hybrid search and print the ranked chunks.
    Search {
        query: String,
        /// Number of results to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Chat over the indexed documents with streamed answers.
    Chat {
        /// Answer from the model alone, skipping retrieval.
        #[arg(long, default_value_t = false)]
        no_rag: bool,
        /// Number of retrieved chunks in the context window.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Response generation temperature.
        #[arg(long, default_value = "0.7")]
        temperature: f32,
    },
}

fn init_tracing(log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}

fn print_report(report: &IngestionReport) {
    if report.is_partial() {
        println!(
            "'{}' partially indexed: {}/{} chunks made it into the index",
            report.document_name, report.indexed, report.chunk_count
        );
        for failure in &report.failures {
            warn!(chunk = %failure.chunk_id, reason = %failure.reason, "chunk failed to index");
        }
    } else {
        println!(
            "'{}' indexed with {} chunks",
            report.document_name, report.chunk_count
        );
    }
}

async fn run_chat<S>(
    store: S,
    embedder: OllamaEmbedder,
    ollama: OllamaClient,
    chat_model: String,
    options: ChatOptions,
) -> anyhow::Result<()>
where
    S: DocumentIndex,
{
    let model = OllamaChatModel::new(ollama, chat_model);
    let coordinator = ChatCoordinator::new(embedder, store, model);
    let mut session = SessionContext::new();

    println!("doc-chat: ask about your documents. /clear resets history, /quit exits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "/quit" {
            break;
        }
        if query == "/clear" {
            session.clear();
            println!("history cleared");
            continue;
        }

        match coordinator.respond(&mut session, query, &options).await {
            Ok(mut stream) => {
                let mut response = String::new();
                while let Some(fragment) = stream.next().await {
                    print!("{fragment}");
                    io::stdout().flush()?;
                    response.push_str(&fragment);
                }
                println!();
                session.push_assistant(response);
            }
            Err(ChatError::GenerationUnavailable(reason)) => {
                warn!(%reason, "generation unavailable");
                println!("The assistant is unavailable right now. Please try again later.");
            }
            Err(error) => {
                warn!(%error, "chat turn failed");
                println!("error: {error}");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_ref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "doc-chat boot"
    );

    let search_config = SearchConfig {
        endpoint: cli.opensearch_url.clone(),
        index_name: cli.index.clone(),
        pipeline_name: cli.search_pipeline.clone(),
        embedding_dimension: cli.embedding_dimension,
    };
    let chat_config = ChatConfig {
        endpoint: cli.ollama_url.clone(),
        chat_model: cli.chat_model.clone(),
        embedding_model: cli.embedding_model.clone(),
        asymmetric_embedding: cli.asymmetric_embedding,
        ..ChatConfig::default()
    };

    let store = OpenSearchStore::new(&search_config);
    let ollama = OllamaClient::new(&chat_config.endpoint);
    let embedder = OllamaEmbedder::new(
        ollama.clone(),
        &chat_config.embedding_model,
        cli.embedding_dimension,
        chat_config.asymmetric_embedding,
    );
    let chunking = ChunkingConfig {
        chunk_size: cli.chunk_size,
        overlap: cli.chunk_overlap,
    };

    match cli.command {
        Command::Ingest { path } => {
            if path.is_dir() {
                let report = ingest_folder(&store, &embedder, &path, chunking).await?;

                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                for entry in &report.reports {
                    print_report(entry);
                }
                println!(
                    "{} documents ingested at {}",
                    report.reports.len(),
                    Utc::now().to_rfc3339()
                );
            } else {
                let report = ingest_file(&store, &embedder, &path, chunking).await?;
                print_report(&report);
            }
        }
        Command::List => {
            store.ensure_index().await?;
            let names = store.list_document_names().await?;
            if names.is_empty() {
                println!("no documents indexed yet");
            }
            for (position, name) in names.iter().enumerate() {
                println!("{}. {name}", position + 1);
            }
        }
        Command::Delete { name } => {
            store.ensure_index().await?;
            store.delete_by_document_name(&name).await?;
            println!("deleted '{name}' from the index");
        }
        Command::Search { query, top_k } => {
            store.ensure_index().await?;
            store.ensure_search_pipeline().await?;

            let embedding = embedder.embed(&query).await?;
            let hits = store.hybrid_search(&query, &embedding, top_k).await?;

            if hits.is_empty() {
                println!("no matches");
            }
            for hit in hits {
                println!(
                    "[{:.4}] {} ({})",
                    hit.score, hit.chunk_id, hit.document_name
                );
                println!("{}", hit.text);
            }
        }
        Command::Chat {
            no_rag,
            top_k,
            temperature,
        } => {
            store.ensure_index().await?;
            if !no_rag {
                store.ensure_search_pipeline().await?;
            }

            let options = ChatOptions {
                use_retrieval: !no_rag,
                top_k,
                temperature,
                max_history_turns: chat_config.max_history_turns,
            };
            run_chat(store, embedder, ollama, chat_config.chat_model, options).await?;
        }
    }

    Ok(())
}
