// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` Sequences host
//!
//! Indexes the timelines of a project directory and keeps the sequence
//! hierarchy current:
//! - `init` writes default host settings
//! - `scan` rebuilds the index from every timeline file
//! - `new`, `rename` and `delete` edit sequences through the index
//! - `tree` prints the hierarchy with validity flags
//! - `watch` follows file changes and refreshes validity periodically

mod error;
mod file_watcher;
mod fs_store;
mod host;
mod project;
mod tree;

use clap::{Parser, Subcommand};
use error::HostError;
use host::SequenceHost;
use ordoplay_sequences::BackingRef;
use project::HostSettings;
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ordoplay-sequences", version, about = "Sequence hierarchy indexer")]
struct Cli {
    /// Project directory
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write default settings to the project
    Init,
    /// Rebuild the index from scratch
    Scan,
    /// Create a sequence
    New {
        /// Sequence name
        name: String,
        /// Timeline ID of the parent. Omit to create a master sequence
        #[arg(long)]
        parent: Option<Uuid>,
    },
    /// Rename a sequence
    Rename {
        /// Timeline ID
        timeline: Uuid,
        /// New name
        name: String,
    },
    /// Delete a sequence and everything nested in it
    Delete {
        /// Timeline ID
        timeline: Uuid,
    },
    /// Print the sequence hierarchy
    Tree {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Follow file changes until interrupted
    Watch,
}

fn directive(text: &str) -> Option<Directive> {
    text.parse().ok()
}

fn init(project_dir: &Path) -> Result<(), HostError> {
    let path = HostSettings::path_in(project_dir);
    if path.is_file() {
        tracing::info!("Settings already present at {:?}", path);
        return Ok(());
    }
    std::fs::create_dir_all(project_dir).map_err(|e| HostError::io(project_dir, e))?;
    HostSettings::default()
        .save(&path)
        .map_err(|source| HostError::Settings {
            path: path.clone(),
            source,
        })?;
    tracing::info!("Wrote default settings to {:?}", path);
    Ok(())
}

fn run(cli: Cli) -> Result<(), HostError> {
    if let Command::Init = cli.command {
        return init(&cli.project);
    }

    let mut host = SequenceHost::open(&cli.project)?;
    match cli.command {
        Command::Init => {}
        Command::Scan => {
            let report = host.scan();
            tracing::info!(
                "Scan complete: {} registered, {} updated, {} invalid",
                report.registered,
                report.updated,
                host.indexer().invalid_count()
            );
        }
        Command::New { name, parent } => {
            let timeline = host.create(&name, parent.map(BackingRef))?;
            println!("{timeline}");
        }
        Command::Rename { timeline, name } => {
            host.rename(BackingRef(timeline), &name)?;
        }
        Command::Delete { timeline } => {
            let removed = host.delete(BackingRef(timeline))?;
            tracing::info!("Removed {} sequences", removed);
        }
        Command::Tree { json } => {
            let tree = tree::build_tree(host.indexer(), host.store());
            if json {
                println!("{}", tree::render_json(&tree)?);
            } else {
                print!("{}", tree::render_text(&tree));
            }
        }
        Command::Watch => {
            tracing::info!("Watching {:?}", host.project_dir());
            host.watch(|| false)?;
        }
    }
    host.shutdown();
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let env_filter = ["ordoplay_sequences=info", "ordoplay_sequences_host=info"]
        .into_iter()
        .filter_map(directive)
        .fold(
            tracing_subscriber::EnvFilter::from_default_env(),
            tracing_subscriber::EnvFilter::add_directive,
        );

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Starting OrdoPlay Sequences v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
