//! PDF RAG server binary
//!
//! Run with: cargo run -p pdf-rag --bin pdf-rag-server -- --config pdf-rag.toml

use clap::Parser;
use pdf_rag::{config::RagConfig, server::RagServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdf-rag-server", version, about = "Chat with a directory of PDFs")]
struct Args {
    /// TOML configuration file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Discard the persisted index and rebuild it from the corpus before serving
    #[arg(long)]
    reindex: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = RagConfig::load(args.config.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Corpus: {}", config.corpus.directory.display());
    tracing::info!("  - Index: {}", config.index.directory.display());
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!(
        "  - LLM: {:?} {} at {}",
        config.llm.backend,
        config.llm.generate_model,
        config.llm.base_url
    );

    let server = RagServer::new(config).await?;
    let engine = server.state().engine().clone();

    match engine.generation().llm().health_check().await {
        Ok(true) => tracing::info!("Language model is reachable"),
        _ => tracing::warn!(
            "Language model not reachable yet; questions will fail until it is"
        ),
    }

    if args.reindex {
        let report = engine.pipeline().rebuild().await?;
        tracing::info!(
            "Re-indexed {} pages from {} files ({} failed)",
            report.documents,
            report.files_loaded,
            report.files_failed
        );
    }

    tracing::info!("Listening on http://{}", server.address());
    server.start().await?;

    Ok(())
}
