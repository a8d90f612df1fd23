use anyhow::Result;
use clap::{Parser, Subcommand};
use code_index::commands::{
    clear_workspace, drop_workspace, init_workspace, search_workspace, show_dependencies,
    show_status,
};
use code_index::config::{Config, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "code-index")]
#[command(about = "Per-workspace semantic code index backed by an embedded vector store")]
#[command(version)]
struct Cli {
    /// Configuration directory, defaults to $CODE_INDEX_HOME or ~/.code-index
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedder, vector store and indexing settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Show or install the native LanceDB driver
    Deps {
        /// Install the driver if it is missing
        #[arg(long)]
        install: bool,
    },
    /// Validate the embedder and create the workspace index
    Init {
        /// Workspace root
        workspace: PathBuf,
    },
    /// Show whether the workspace has a complete index
    Status {
        /// Workspace root
        workspace: PathBuf,
    },
    /// Search the workspace index
    Search {
        /// Workspace root
        workspace: PathBuf,
        /// Natural language or code query
        query: String,
        /// Only return chunks under this workspace-relative directory
        #[arg(long)]
        dir: Option<String>,
        /// Minimum similarity score between 0 and 1
        #[arg(long)]
        min_score: Option<f32>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove all indexed chunks but keep the index
    Clear {
        /// Workspace root
        workspace: PathBuf,
    },
    /// Delete the workspace index from disk
    Drop {
        /// Workspace root
        workspace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Deps { install } => {
            show_dependencies(&config_dir, install).await?;
        }
        Commands::Init { workspace } => {
            init_workspace(&config_dir, &workspace).await?;
        }
        Commands::Status { workspace } => {
            show_status(&config_dir, &workspace).await?;
        }
        Commands::Search {
            workspace,
            query,
            dir,
            min_score,
            limit,
        } => {
            search_workspace(
                &config_dir,
                &workspace,
                &query,
                dir.as_deref(),
                min_score,
                limit,
            )
            .await?;
        }
        Commands::Clear { workspace } => {
            clear_workspace(&config_dir, &workspace).await?;
        }
        Commands::Drop { workspace } => {
            drop_workspace(&config_dir, &workspace).await?;
        }
    }

    Ok(())
}
