//! Codevec CLI - Command-line interface
//!
//! Usage:
//!   codevec index [ROOT] [--include <GLOBS>] [--exclude <GLOBS>]
//!   codevec search <QUERY> [--limit <N>]
//!   codevec context <TEXT> [--limit <N>]
//!   codevec clear
//!   codevec status

use anyhow::Context;
use clap::{Parser, Subcommand};
use codevec_core::{AppConfig, SearchResult};
use codevec_index::{
    IndexingService, TracingProgress, DEFAULT_CONTEXT_LIMIT, DEFAULT_SEARCH_LIMIT,
};
use codevec_vector::{
    create_embedding_client, LocalVectorStore, ProviderManager, QdrantStore, VectorDatabase,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Snapshot directory for the local backend when none is configured
const DEFAULT_LOCAL_STORAGE: &str = ".codevec";

#[derive(Parser)]
#[command(name = "codevec")]
#[command(about = "Semantic code search over a vector database")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vector backend to use (local, qdrant)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index source files under a workspace root
    Index {
        /// Workspace root
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Include globs, comma-separated
        #[arg(long)]
        include: Option<String>,

        /// Exclude globs, comma-separated
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Search indexed code
    Search {
        query: String,

        #[arg(long, short, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Find code related to a snippet of context
    Context {
        text: String,

        #[arg(long, short, default_value_t = DEFAULT_CONTEXT_LIMIT)]
        limit: usize,
    },
    /// Remove every indexed document
    Clear,
    /// Show backend status
    Status,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    if let Some(provider) = &cli.provider {
        config.vector.provider = provider.clone();
    }
    if config.vector.provider.eq_ignore_ascii_case("local") && config.vector.storage_path.is_none()
    {
        config.vector.storage_path = Some(PathBuf::from(DEFAULT_LOCAL_STORAGE));
    }
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Register both backends and activate the configured one
async fn build_manager(config: &AppConfig) -> anyhow::Result<Arc<ProviderManager>> {
    let embedder = create_embedding_client(&config.embedding)?;

    let manager = Arc::new(ProviderManager::new());
    manager
        .register_provider(Arc::new(LocalVectorStore::new(embedder.clone())))
        .await;
    manager
        .register_provider(Arc::new(QdrantStore::new(embedder)))
        .await;

    let provider = &config.vector.provider;
    let activated = manager
        .set_active_provider(provider, Some(config.vector.to_options()))
        .await
        .with_context(|| format!("failed to initialize vector provider '{provider}'"))?;
    if !activated {
        anyhow::bail!(
            "unknown vector provider '{provider}' (available: {})",
            manager.provider_names().await.join(", ")
        );
    }

    manager.set_enabled(config.vector.enabled);
    Ok(manager)
}

fn print_results(results: &[SearchResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let path = result
            .document
            .metadata
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(result.document.id.as_str());
        let preview: String = result
            .document
            .content
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .chars()
            .take(100)
            .collect();
        println!("{:>2}. {:.4}  {}", rank + 1, result.score, path);
        println!("      {preview}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config);

    let manager = build_manager(&config).await?;
    let service = IndexingService::new(manager.clone(), config.indexing.clone());

    let outcome = run(&cli, &service, &manager).await;
    manager.close().await;
    outcome
}

async fn run(
    cli: &Cli,
    service: &IndexingService,
    manager: &ProviderManager,
) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Index {
            root,
            include,
            exclude,
        } => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current batch");
                    on_interrupt.cancel();
                }
            });

            let count = service
                .index_workspace(
                    root,
                    include.as_deref(),
                    exclude.as_deref(),
                    &TracingProgress,
                    &cancel,
                )
                .await?;

            if cancel.is_cancelled() {
                println!("Indexing cancelled: {count} documents indexed");
            } else {
                println!("Indexed {count} documents");
            }
        }
        Commands::Search { query, limit } => {
            let results = service.semantic_search(query, *limit).await?;
            print_results(&results, cli.json)?;
        }
        Commands::Context { text, limit } => {
            let results = service.get_relevant_code(text, *limit).await?;
            print_results(&results, cli.json)?;
        }
        Commands::Clear => {
            if !manager.delete_all().await {
                anyhow::bail!("failed to clear the index");
            }
            println!("Index cleared");
        }
        Commands::Status => {
            let provider = manager.active_provider().await;
            let status = serde_json::json!({
                "enabled": manager.is_enabled(),
                "provider": provider.as_ref().map(|p| p.name().to_string()),
                "dimension": provider.as_ref().map(|p| p.dimension()),
                "documents": manager.count().await,
                "registered": manager.provider_names().await,
            });

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("enabled:    {}", manager.is_enabled());
                println!("provider:   {}", status["provider"].as_str().unwrap_or("none"));
                println!("dimension:  {}", status["dimension"]);
                println!("documents:  {}", status["documents"]);
                println!("registered: {}", manager.provider_names().await.join(", "));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_defaults() {
        let cli = Cli::try_parse_from(["codevec", "search", "parse tokens"]).unwrap();
        match cli.command {
            Commands::Search { query, limit } => {
                assert_eq!(query, "parse tokens");
                assert_eq!(limit, DEFAULT_SEARCH_LIMIT);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_index_with_globals() {
        let cli = Cli::try_parse_from([
            "codevec",
            "index",
            "src",
            "--include",
            "**/*.{rs,toml}",
            "--provider",
            "qdrant",
        ])
        .unwrap();

        assert_eq!(cli.provider.as_deref(), Some("qdrant"));
        match cli.command {
            Commands::Index { root, include, exclude } => {
                assert_eq!(root, PathBuf::from("src"));
                assert_eq!(include.as_deref(), Some("**/*.{rs,toml}"));
                assert!(exclude.is_none());
            }
            _ => panic!("expected index"),
        }
    }

    #[test]
    fn test_local_provider_gets_default_storage() {
        let cli = Cli::try_parse_from(["codevec", "--provider", "local", "status"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.vector.provider, "local");
        assert!(config.vector.storage_path.is_some());
    }
}
