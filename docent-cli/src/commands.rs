//! CLI subcommand handlers.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use docent_core::config::{DocentConfig, load_config, workspace_config_path};
use docent_core::server::{self, AppState};
use docent_core::{
    IndexBuilder, IndexHandle, IndexSnapshot, IngestSummary, RagPipeline, VectorIndex,
};
use tracing::warn;

use crate::Commands;
use crate::ConfigAction;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_path),
        Commands::BuildIndex { source, force } => {
            let config = load(workspace, config_path)?;
            let summary = build_index(&config, workspace, &source, force).await?;
            print_summary(&summary);
            Ok(())
        }
        Commands::Query {
            text,
            show_contexts,
        } => {
            let config = load(workspace, config_path)?;
            query(&config, workspace, &text, show_contexts).await
        }
        Commands::Serve { host, port } => {
            let mut config = load(workspace, config_path)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config, workspace).await
        }
        Commands::Inspect => {
            let config = load(workspace, config_path)?;
            inspect(&config, workspace)
        }
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<DocentConfig> {
    load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = toml::to_string_pretty(&DocentConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Build a fresh index from `source` and save it under `index.path`.
pub(crate) async fn build_index(
    config: &DocentConfig,
    workspace: &Path,
    source_path: &Path,
    force: bool,
) -> anyhow::Result<IngestSummary> {
    let index_dir = config.index.resolve(workspace);
    if IndexSnapshot::exists(&index_dir) && !force {
        anyhow::bail!(
            "An index already exists at {}. Re-run with --force to rebuild it.",
            index_dir.display()
        );
    }

    let builder = IndexBuilder::from_config(config)?;
    let (index, summary) = builder
        .build_from_source(source_path)
        .await
        .with_context(|| format!("Failed to index documents from {}", source_path.display()))?;

    if index.is_empty() {
        anyhow::bail!(
            "No chunks were indexed from {} document(s); the existing index was left untouched.",
            summary.documents_seen
        );
    }
    index
        .save(&index_dir)
        .with_context(|| format!("Failed to save index to {}", index_dir.display()))?;
    Ok(summary)
}

fn print_summary(summary: &IngestSummary) {
    println!("Documents seen:    {}", summary.documents_seen);
    println!("Documents indexed: {}", summary.documents_indexed);
    println!("Documents skipped: {}", summary.documents_skipped);
    println!("Chunks indexed:    {}", summary.chunks_indexed);
    for failure in &summary.failures {
        println!("  skipped {}: {}", failure.source_id, failure.reason);
    }
}

async fn query(
    config: &DocentConfig,
    workspace: &Path,
    text: &str,
    show_contexts: bool,
) -> anyhow::Result<()> {
    let index_dir = config.index.resolve(workspace);
    let handle = Arc::new(IndexHandle::empty());
    handle
        .load_from(&index_dir)
        .with_context(|| {
            format!(
                "No usable index at {}. Run `docent build-index` first.",
                index_dir.display()
            )
        })?;

    let pipeline = RagPipeline::from_config(config, handle)?;
    let (answer, retrieved) = pipeline.answer_with_contexts(text, &[]).await;

    if show_contexts {
        println!("--- Retrieved contexts ({}) ---", retrieved.hits.len());
        for (i, (hit, label)) in retrieved.hits.iter().zip(&retrieved.sources).enumerate() {
            println!("[{}] distance={:.4} {}", i + 1, hit.distance, label);
            println!("{}\n", hit.chunk.content);
        }
        println!("--- Answer ---");
    }
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for source in &answer.sources {
            println!("  - {source}");
        }
    }
    Ok(())
}

async fn serve(config: DocentConfig, workspace: &Path) -> anyhow::Result<()> {
    let index_dir = config.index.resolve(workspace);
    let handle = Arc::new(IndexHandle::empty());
    if let Err(e) = handle.load_from(&index_dir) {
        warn!(
            path = %index_dir.display(),
            error = %e,
            "Starting without an index; POST /api/index/reload once one is built"
        );
    }

    let pipeline = Arc::new(RagPipeline::from_config(&config, Arc::clone(&handle))?);
    let state = AppState::new(pipeline, handle, index_dir);
    let addr = config.server.bind_addr();
    server::run(state, &addr)
        .await
        .with_context(|| format!("Chat API failed on {addr}"))
}

fn inspect(config: &DocentConfig, workspace: &Path) -> anyhow::Result<()> {
    let index_dir = config.index.resolve(workspace);
    let index = VectorIndex::load(&index_dir)
        .with_context(|| format!("No usable index at {}", index_dir.display()))?;
    let stats = IndexStats::from_index(&index);

    println!("Index:      {}", index_dir.display());
    println!("Chunks:     {}", stats.chunks);
    println!("Sources:    {}", stats.sources);
    match stats.dimension {
        Some(d) => println!("Dimension:  {d}"),
        None => println!("Dimension:  (unset)"),
    }
    println!("Avg chars:  {:.1}", stats.avg_chunk_chars);
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct IndexStats {
    chunks: usize,
    sources: usize,
    dimension: Option<usize>,
    avg_chunk_chars: f64,
}

impl IndexStats {
    fn from_index(index: &VectorIndex) -> Self {
        let documents = index.documents();
        let sources: BTreeSet<&str> = documents
            .iter()
            .map(|c| c.metadata.source_id.as_str())
            .collect();
        let total_chars: usize = documents.iter().map(|c| c.content.chars().count()).sum();
        Self {
            chunks: documents.len(),
            sources: sources.len(),
            dimension: index.dimension(),
            avg_chunk_chars: if documents.is_empty() {
                0.0
            } else {
                total_chars as f64 / documents.len() as f64
            },
        }
    }
}
