use anyhow::{Context, Result, bail};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::VectorStore;
use crate::dependencies::{DependencyManager, LANCEDB_PACKAGE, PINNED_VERSION, SpinnerProgress};
use crate::factory::ServiceFactory;

/// Characters of a code chunk shown per search hit
const PREVIEW_LENGTH: usize = 240;

fn load_factory(config_dir: &Path) -> Result<ServiceFactory> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    Ok(ServiceFactory::new(config).with_progress(Arc::new(SpinnerProgress::new())))
}

fn resolve_workspace(workspace: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(workspace)
        .with_context(|| format!("Workspace not found: {}", workspace.display()))
}

/// Open an existing workspace store without installing the native driver
async fn open_store(config_dir: &Path, workspace: &Path) -> Result<Arc<dyn VectorStore>> {
    let factory = load_factory(config_dir)?;
    let workspace = resolve_workspace(workspace)?;
    let store = factory
        .open_vector_store(&workspace)
        .await
        .context("Failed to open vector store")?;
    Ok(store)
}

/// Show native driver status, installing it when `install` is set
#[inline]
pub async fn show_dependencies(config_dir: &Path, install: bool) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let manager = DependencyManager::from_config(&config)?;
    let target = manager.target();

    println!("{}", style("Native LanceDB driver").bold().cyan());
    println!("  Package: {}@{}", LANCEDB_PACKAGE, PINNED_VERSION);
    println!("  Platform: {}", target.package_name());
    println!("  Directory: {}", manager.deps_dir().display());

    if manager.check_binaries() {
        println!("  Status: {}", style("installed").green());
        return Ok(());
    }

    if !install {
        println!("  Status: {}", style("not installed").yellow());
        println!("Run 'code-index deps --install' to install it.");
        return Ok(());
    }

    manager
        .ensure_available(&SpinnerProgress::new())
        .await
        .context("Failed to install native LanceDB driver")?;
    println!("  Status: {}", style("installed").green());

    Ok(())
}

/// Validate the embedder and create or open the workspace's collection
#[inline]
pub async fn init_workspace(config_dir: &Path, workspace: &Path) -> Result<()> {
    let factory = load_factory(config_dir)?;
    let workspace = resolve_workspace(workspace)?;

    let embedder = factory
        .create_embedder()
        .context("Failed to create embedder")?;
    let validation = factory.validate_embedder(embedder.as_ref()).await;
    if !validation.valid {
        bail!(
            "Embedder configuration is invalid: {}",
            validation.error.unwrap_or_default()
        );
    }

    let store = factory
        .create_vector_store(&workspace)
        .await
        .context("Failed to create vector store")?;
    let created = store.initialize().await?;

    info!("Initialized index for {:?}", workspace);
    if created {
        println!("Created new index for {}", workspace.display());
    } else {
        println!("Opened existing index for {}", workspace.display());
    }

    Ok(())
}

#[inline]
pub async fn show_status(config_dir: &Path, workspace: &Path) -> Result<()> {
    let store = open_store(config_dir, workspace).await?;

    let exists = store.collection_exists().await;
    let indexed = store.has_indexed_data().await;

    println!("{}", style("Index Status").bold().cyan());
    println!("  Workspace: {}", workspace.display());
    println!(
        "  Collection: {}",
        if exists {
            style("present").green()
        } else {
            style("missing").yellow()
        }
    );
    println!(
        "  Indexing: {}",
        if indexed {
            style("complete").green()
        } else {
            style("incomplete or empty").yellow()
        }
    );

    Ok(())
}

#[inline]
pub async fn search_workspace(
    config_dir: &Path,
    workspace: &Path,
    query: &str,
    directory: Option<&str>,
    min_score: Option<f32>,
    limit: Option<usize>,
) -> Result<()> {
    let factory = load_factory(config_dir)?;
    let workspace = resolve_workspace(workspace)?;
    let indexing = &factory.config().indexing;

    let embedder = factory
        .create_embedder()
        .context("Failed to create embedder")?;
    let store = factory
        .open_vector_store(&workspace)
        .await
        .context("Failed to open vector store")?;

    if !store.has_indexed_data().await {
        warn!("Searching an index that is incomplete or empty");
    }

    let mut vectors = embedder
        .create_embeddings(&[query.to_string()])
        .await
        .context("Failed to embed query")?;
    let Some(query_vector) = vectors.pop() else {
        bail!("Embedder returned no vector for the query");
    };

    let results = store
        .search(
            &query_vector,
            directory,
            Some(min_score.unwrap_or(indexing.search_min_score)),
            Some(limit.unwrap_or(indexing.search_max_results)),
        )
        .await
        .context("Search failed")?;

    if results.is_empty() {
        println!("No results for '{}'", query);
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} {}:{}-{}",
            rank + 1,
            style(format!("[{:.3}]", result.score)).green(),
            style(&result.payload.file_path).cyan(),
            result.payload.start_line,
            result.payload.end_line
        );
        let preview: String = result
            .payload
            .code_chunk
            .chars()
            .take(PREVIEW_LENGTH)
            .collect();
        for line in preview.lines() {
            println!("     {}", style(line).dim());
        }
        println!();
    }

    Ok(())
}

/// Remove every indexed point but keep the collection
#[inline]
pub async fn clear_workspace(config_dir: &Path, workspace: &Path) -> Result<()> {
    let store = open_store(config_dir, workspace).await?;
    store
        .clear_collection()
        .await
        .context("Failed to clear index")?;
    println!("Cleared index for {}", workspace.display());
    Ok(())
}

/// Delete the workspace's collection entirely
#[inline]
pub async fn drop_workspace(config_dir: &Path, workspace: &Path) -> Result<()> {
    let store = open_store(config_dir, workspace).await?;
    store
        .delete_collection()
        .await
        .context("Failed to delete index")?;
    println!("Deleted index for {}", workspace.display());
    Ok(())
}
